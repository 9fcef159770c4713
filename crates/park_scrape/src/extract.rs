use std::collections::HashMap;

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

lazy_static! {
    static ref LOCATION_OPTIONS: Selector = Selector::parse(
        r#"select[name="ctl00$MainContentPlaceHolder$LocationList"] option"#
    )
    .unwrap();
    static ref SELECTED_LOCATION: Selector = Selector::parse(
        r#"select[name="ctl00$MainContentPlaceHolder$LocationList"] > option[selected]"#
    )
    .unwrap();
    static ref SELECTED_MAP: Selector = Selector::parse(
        r#"select[name="ctl00$MainContentPlaceHolder$MapList"] > option[selected]"#
    )
    .unwrap();
    static ref AVAILABILITY_MSG: Selector = Selector::parse("#viewAvailabilityMsg").unwrap();
    static ref LIST_TABLE_LINKS: Selector = Selector::parse(".list_new a").unwrap();
    static ref LIST_ROWS: Selector = Selector::parse(".list_new tbody tr").unwrap();
    static ref CELLS: Selector = Selector::parse("td").unwrap();
    static ref ANCHOR: Selector = Selector::parse("a").unwrap();
    static ref FORMS: Selector = Selector::parse("form").unwrap();
    static ref HIDDEN_INPUTS: Selector = Selector::parse(r#"input[type="hidden"]"#).unwrap();
    static ref DETAILS_ROWS: Selector = Selector::parse("table.rceDetails tbody tr").unwrap();
    static ref DETAILS_LABEL: Selector = Selector::parse("td.label").unwrap();
    static ref DETAILS_VALUE: Selector = Selector::parse("td.value").unwrap();
    static ref SITE_IMAGES: Selector = Selector::parse("img.SiteImage").unwrap();
    static ref PORTAL_PARK_LINKS: Selector =
        Selector::parse("#parksnavbar > ul > li:first-child ul > li > a").unwrap();
    static ref PARK_HEADING: Selector = Selector::parse(".park-heading").unwrap();
    static ref OPERATING_ROWS: Selector =
        Selector::parse("div.panel-operating-dates tr").unwrap();
    static ref CAMPING_ICON: Selector = Selector::parse("span.campin-icon").unwrap();
    static ref INTERIOR_ICON: Selector = Selector::parse("span.interior-icon").unwrap();
    static ref DAY_USE_ICON: Selector = Selector::parse("span.day-use-icon").unwrap();
    static ref DETAIL_CALL_RE: Regex =
        Regex::new(r"javascript:SelectRce\('([^']+)','([^']+)','([^']+)'\);").unwrap();
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// A park entry of the viewer's location dropdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParkOption {
    /// Form value submitted to select this park.
    pub value: String,
    /// Display name of the park.
    pub name: String,
}

/// Parks listed in the viewer's location dropdown.
pub fn park_options(doc: &Html) -> Vec<ParkOption> {
    doc.select(&LOCATION_OPTIONS)
        .filter_map(|option| {
            let value = option.value().attr("value")?.to_string();
            let name = text_of(option);
            if name.is_empty() {
                return None;
            }
            Some(ParkOption { value, name })
        })
        .collect()
}

/// Park, campground, and parent-park names of the current viewer selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedNames {
    /// Parent park name when the selection reads `"Parent - Park"`.
    pub parent_park_name: Option<String>,
    /// Selected park name.
    pub park_name: String,
    /// Selected campground, `None` when all campgrounds are listed.
    pub campground_name: Option<String>,
}

/// Read the selected park and campground from the viewer dropdowns.
pub fn selected_names(doc: &Html) -> Option<SelectedNames> {
    let raw = doc.select(&SELECTED_LOCATION).next().map(text_of)?;
    if raw.is_empty() {
        return None;
    }

    let (parent_park_name, park_name) = match raw.split_once(" - ") {
        Some((parent, park)) => (Some(parent.to_string()), park.to_string()),
        None => (None, raw),
    };

    let campground_name = doc
        .select(&SELECTED_MAP)
        .next()
        .map(text_of)
        .filter(|name| !name.is_empty() && name != "All Campgrounds");

    Some(SelectedNames {
        parent_park_name,
        park_name,
        campground_name,
    })
}

/// Whether the viewer is asking for a campground area to be chosen first.
pub fn needs_area_choice(doc: &Html) -> bool {
    doc.select(&AVAILABILITY_MSG).next().is_some()
}

/// Links to the campground areas offered by the disambiguation page.
pub fn area_links(doc: &Html) -> Vec<String> {
    doc.select(&LIST_TABLE_LINKS)
        .filter_map(|anchor| anchor.value().attr("href"))
        .map(str::to_string)
        .collect()
}

/// One row of the site listing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteRow {
    /// Site number, first token of the site link text.
    pub site_number: String,
    /// Site type column.
    pub site_type: Option<String>,
    /// Availability status column (link text when present).
    pub status: Option<String>,
    /// Href of the site details link.
    pub detail_href: Option<String>,
}

/// Rows of the site listing table. Header and spacer rows are skipped.
pub fn site_rows(doc: &Html) -> Vec<SiteRow> {
    doc.select(&LIST_ROWS)
        .filter_map(|row| {
            let cells: Vec<ElementRef<'_>> = row.select(&CELLS).collect();
            if cells.len() < 4 {
                return None;
            }

            let site_cell = cells[1];
            let site_link = site_cell.select(&ANCHOR).next()?;
            let site_number = text_of(site_link)
                .split_whitespace()
                .next()?
                .to_string();

            let site_type = Some(text_of(cells[2])).filter(|t| !t.is_empty());

            let status_cell = cells[3];
            let status = status_cell
                .select(&ANCHOR)
                .next()
                .map(text_of)
                .or_else(|| Some(text_of(status_cell)))
                .filter(|s| !s.is_empty());

            let detail_href = site_cell
                .select(&ANCHOR)
                .filter_map(|a| a.value().attr("href"))
                .next()
                .map(str::to_string);

            Some(SiteRow {
                site_number,
                site_type,
                status,
                detail_href,
            })
        })
        .collect()
}

/// Arguments of the `SelectRce` JS call that opens a site's details:
/// `(loc_id, rce_id)`. `None` when the href carries no such call.
pub fn detail_call(href: &str) -> Option<(String, String)> {
    let captures = DETAIL_CALL_RE.captures(href)?;
    Some((captures[1].to_string(), captures[3].to_string()))
}

/// Label to value pairs of the site details table.
pub fn details_table(doc: &Html) -> HashMap<String, String> {
    doc.select(&DETAILS_ROWS)
        .filter_map(|row| {
            let label = row.select(&DETAILS_LABEL).next().map(text_of)?;
            let value = row.select(&DETAILS_VALUE).next().map(text_of)?;
            if label.is_empty() {
                return None;
            }
            Some((label, value))
        })
        .collect()
}

/// Source URLs of the site photos on the pictures page.
pub fn site_image_urls(doc: &Html) -> Vec<String> {
    doc.select(&SITE_IMAGES)
        .filter_map(|img| img.value().attr("src"))
        .map(str::to_string)
        .collect()
}

/// The viewer's main form: its action URL and hidden fields, which must be
/// echoed back when posting a park/date selection.
#[derive(Debug, Clone, Default)]
pub struct ViewerForm {
    /// Form action, relative to the page URL.
    pub action: Option<String>,
    /// Hidden input name/value pairs.
    pub hidden_fields: Vec<(String, String)>,
}

/// Extract the main form of the viewer page. Prefers the form named
/// `MainForm`, falling back to the first form on the page.
pub fn main_form(doc: &Html) -> Option<ViewerForm> {
    let form = doc
        .select(&FORMS)
        .find(|f| f.value().attr("name") == Some("MainForm"))
        .or_else(|| doc.select(&FORMS).next())?;

    let hidden_fields = form
        .select(&HIDDEN_INPUTS)
        .filter_map(|input| {
            let name = input.value().attr("name")?.to_string();
            let value = input.value().attr("value").unwrap_or("").to_string();
            Some((name, value))
        })
        .collect();

    Some(ViewerForm {
        action: form.value().attr("action").map(str::to_string),
        hidden_fields,
    })
}

/// Park name and link pairs from the portal navigation bar.
pub fn portal_park_links(doc: &Html) -> Vec<(String, String)> {
    doc.select(&PORTAL_PARK_LINKS)
        .filter_map(|anchor| {
            let name = text_of(anchor);
            let href = anchor.value().attr("href")?.to_string();
            if name.is_empty() {
                return None;
            }
            Some((name, href))
        })
        .collect()
}

/// Park name from the portal park page heading.
pub fn park_heading(doc: &Html) -> Option<String> {
    doc.select(&PARK_HEADING)
        .next()
        .map(text_of)
        .filter(|name| !name.is_empty())
}

/// Description list of a portal section (`#activities` or `#facilities`):
/// each `h2` names the entry described by the following `p`.
pub fn description_list(doc: &Html, section_id: &str) -> HashMap<String, String> {
    let selector = match Selector::parse(&format!("#{} *", section_id)) {
        Ok(selector) => selector,
        Err(_) => return HashMap::new(),
    };

    let mut descriptions = HashMap::new();
    let mut name: Option<String> = None;
    for child in doc.select(&selector) {
        match child.value().name() {
            "h2" => name = Some(text_of(child)),
            "p" => {
                if let Some(name) = name.clone() {
                    descriptions.insert(name, text_of(child));
                }
            }
            _ => {}
        }
    }
    descriptions
}

/// Href of the park overview map link, when the maps page carries one.
pub fn park_overview_map(doc: &Html) -> Option<String> {
    doc.select(&ANCHOR)
        .find(|a| a.text().collect::<String>().contains("Park Overview"))
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}

/// One row of the portal's operating-dates panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatingRow {
    /// Park (or child park) name, `" - "` prefix stripped.
    pub name: String,
    /// Usage tags derived from the row icons.
    pub usages: Vec<String>,
    /// First operating day.
    pub from: Option<NaiveDate>,
    /// Last operating day.
    pub to: Option<NaiveDate>,
}

/// Rows of the operating-dates panel, header excluded.
pub fn operating_rows(doc: &Html) -> Vec<OperatingRow> {
    doc.select(&OPERATING_ROWS)
        .skip(1)
        .filter_map(|row| {
            let cells: Vec<ElementRef<'_>> = row.select(&CELLS).collect();
            if cells.len() < 3 {
                return None;
            }

            let raw_name = text_of(cells[0]);
            let name = match raw_name.rsplit_once(" - ") {
                Some((_, suffix)) => suffix.to_string(),
                None => raw_name,
            };
            if name.is_empty() {
                return None;
            }

            let icons = cells[1];
            let mut usages = Vec::new();
            if icons.select(&CAMPING_ICON).next().is_some() {
                usages.push("Camping".to_string());
            }
            if icons.select(&INTERIOR_ICON).next().is_some() {
                usages.push("Backcountry".to_string());
            }
            if icons.select(&DAY_USE_ICON).next().is_some() {
                usages.push("Day-use".to_string());
            }

            let (from, to) = match text_of(cells[2]).split_once(" to ") {
                Some((from, to)) => (parse_operating_date(from), parse_operating_date(to)),
                None => (None, None),
            };

            Some(OperatingRow {
                name,
                usages,
                from,
                to,
            })
        })
        .collect()
}

/// Parse an operating date such as `"May 12, 2024"`.
pub fn parse_operating_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    for format in ["%B %d, %Y", "%b %d, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING_PAGE: &str = r##"
        <html><body>
        <form name="MainForm" action="Viewer.aspx" method="post">
          <input type="hidden" name="__VIEWSTATE" value="abc123" />
          <input type="hidden" name="__EVENTVALIDATION" value="ev456" />
          <select name="ctl00$MainContentPlaceHolder$LocationList">
            <option value="-2147483648">Ontario Parks</option>
            <option value="101" selected="selected">Algonquin - Achray</option>
            <option value="102">Killarney</option>
          </select>
          <select name="ctl00$MainContentPlaceHolder$MapList">
            <option value="-1" selected="selected">All Campgrounds</option>
          </select>
          <table class="list_new"><tbody>
            <tr><td>hdr</td></tr>
            <tr>
              <td><input type="checkbox" /></td>
              <td><a href="javascript:SelectRce('714','x','50231');">407 (Tent)</a></td>
              <td>Regular Campsite</td>
              <td><a href="#">Reserve!</a></td>
            </tr>
            <tr>
              <td><input type="checkbox" /></td>
              <td><a href="javascript:SelectRce('714','x','50232');">408</a></td>
              <td>Regular Campsite</td>
              <td>Unavailable</td>
            </tr>
          </tbody></table>
        </form>
        </body></html>
    "##;

    const AREA_PAGE: &str = r#"
        <html><body>
        <div id="viewAvailabilityMsg">Choose a campground</div>
        <table class="list_new"><tbody>
          <tr><td><a href="Viewer.aspx?map=1">Achray</a></td></tr>
          <tr><td><a href="Viewer.aspx?map=2">Mew Lake</a></td></tr>
        </tbody></table>
        </body></html>
    "#;

    #[test]
    fn parses_park_options() {
        let doc = Html::parse_document(LISTING_PAGE);
        let options = park_options(&doc);
        assert_eq!(options.len(), 3);
        assert_eq!(options[1].value, "101");
        assert_eq!(options[1].name, "Algonquin - Achray");
    }

    #[test]
    fn parses_selected_names_with_parent() {
        let doc = Html::parse_document(LISTING_PAGE);
        let names = selected_names(&doc).unwrap();
        assert_eq!(names.parent_park_name.as_deref(), Some("Algonquin"));
        assert_eq!(names.park_name, "Achray");
        assert_eq!(names.campground_name, None);
    }

    #[test]
    fn parses_site_rows() {
        let doc = Html::parse_document(LISTING_PAGE);
        let rows = site_rows(&doc);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].site_number, "407");
        assert_eq!(rows[0].site_type.as_deref(), Some("Regular Campsite"));
        assert_eq!(rows[0].status.as_deref(), Some("Reserve!"));
        assert_eq!(rows[1].site_number, "408");
        assert_eq!(rows[1].status.as_deref(), Some("Unavailable"));
    }

    #[test]
    fn extracts_detail_call_arguments() {
        let (loc_id, rce_id) =
            detail_call("javascript:SelectRce('714','x','50231');").unwrap();
        assert_eq!(loc_id, "714");
        assert_eq!(rce_id, "50231");
        assert!(detail_call("Viewer.aspx?map=1").is_none());
    }

    #[test]
    fn extracts_main_form() {
        let doc = Html::parse_document(LISTING_PAGE);
        let form = main_form(&doc).unwrap();
        assert_eq!(form.action.as_deref(), Some("Viewer.aspx"));
        assert!(form
            .hidden_fields
            .contains(&("__VIEWSTATE".to_string(), "abc123".to_string())));
    }

    #[test]
    fn area_pages_are_recognized() {
        let listing = Html::parse_document(LISTING_PAGE);
        let area = Html::parse_document(AREA_PAGE);
        assert!(!needs_area_choice(&listing));
        assert!(needs_area_choice(&area));
        assert_eq!(
            area_links(&area),
            vec!["Viewer.aspx?map=1", "Viewer.aspx?map=2"]
        );
    }

    #[test]
    fn parses_details_table() {
        let doc = Html::parse_document(
            r#"<table class="rceDetails"><tbody>
               <tr><td class="label">Site Shade</td><td class="value">Partial</td></tr>
               <tr><td class="label">Privacy</td><td class="value">Good</td></tr>
               </tbody></table>"#,
        );
        let details = details_table(&doc);
        assert_eq!(details.get("Site Shade").map(String::as_str), Some("Partial"));
        assert_eq!(details.get("Privacy").map(String::as_str), Some("Good"));
    }

    #[test]
    fn parses_site_images() {
        let doc = Html::parse_document(
            r#"<img class="SiteImage" src="/photos/a.jpg" />
               <img class="Other" src="/photos/b.jpg" />"#,
        );
        assert_eq!(site_image_urls(&doc), vec!["/photos/a.jpg"]);
    }

    #[test]
    fn parses_description_list() {
        let doc = Html::parse_document(
            r#"<div id="activities">
                 <h2>Canoeing</h2><p>Many routes.</p>
                 <h2>Fishing</h2><p>Lake trout.</p>
               </div>"#,
        );
        let activities = description_list(&doc, "activities");
        assert_eq!(activities.get("Canoeing").map(String::as_str), Some("Many routes."));
        assert_eq!(activities.len(), 2);
    }

    #[test]
    fn parses_operating_rows() {
        let doc = Html::parse_document(
            r#"<div class="panel-operating-dates"><table>
               <tr><th>Area</th><th>Usage</th><th>Dates</th></tr>
               <tr>
                 <td>Algonquin - Achray</td>
                 <td><span class="campin-icon"></span><span class="day-use-icon"></span></td>
                 <td>May 12, 2024 to October 14, 2024</td>
               </tr>
               <tr>
                 <td>Brent</td>
                 <td></td>
                 <td>Open all year</td>
               </tr>
               </table></div>"#,
        );
        let rows = operating_rows(&doc);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Achray");
        assert_eq!(rows[0].usages, vec!["Camping", "Day-use"]);
        assert_eq!(rows[0].from, NaiveDate::from_ymd_opt(2024, 5, 12));
        assert_eq!(rows[0].to, NaiveDate::from_ymd_opt(2024, 10, 14));
        assert_eq!(rows[1].name, "Brent");
        assert_eq!(rows[1].from, None);
    }

    #[test]
    fn parses_overview_map_link() {
        let doc = Html::parse_document(
            r#"<a href="/pdf/achray.pdf">Park Overview Map</a>"#,
        );
        assert_eq!(park_overview_map(&doc).as_deref(), Some("/pdf/achray.pdf"));
    }
}
