/// Errors raised while crawling pages or persisting scraped items.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// An HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An expected page fragment was absent.
    #[error("Missing page fragment: {0}")]
    MissingFragment(String),

    /// Scraped data could not be converted for storage.
    #[error("Data format error: {0}")]
    DataFormat(String),

    /// Writing a downloaded image to the store failed.
    #[error("Image store error: {0}")]
    ImageStore(#[from] std::io::Error),
}
