use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedLink {
    pub href: String,
}

/// A single entry of a parsed RSS/Atom feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_at: Option<OffsetDateTime>,
    pub links: Vec<FeedLink>,
}

impl FeedEntry {
    pub fn title_text(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    pub fn description_text(&self) -> &str {
        self.description.as_deref().unwrap_or_default()
    }

    /// The entry's first link, or an empty string when it has none.
    ///
    /// An empty link fails to parse later on, which is what makes the entry
    /// get skipped.
    pub fn primary_link(&self) -> &str {
        self.links.first().map(|l| l.href.as_str()).unwrap_or_default()
    }
}
