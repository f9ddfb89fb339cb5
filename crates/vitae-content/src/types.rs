use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Job,
    Venue,
    Event,
    Company,
    Blog,
}

impl std::fmt::Display for PostKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Job => "job",
            Self::Venue => "venue",
            Self::Event => "event",
            Self::Company => "company",
            Self::Blog => "blog",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for PostKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "job" => Ok(Self::Job),
            "venue" => Ok(Self::Venue),
            "event" => Ok(Self::Event),
            "company" => Ok(Self::Company),
            "blog" => Ok(Self::Blog),
            other => Err(format!("unknown post kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
    /// Taken down, e.g. a job listing that outlived its two months.
    Inactive,
    Filled,
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Inactive => "inactive",
            Self::Filled => "filled",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for PostStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "inactive" => Ok(Self::Inactive),
            "filled" => Ok(Self::Filled),
            other => Err(format!("unknown post status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub kind: PostKind,
    /// Owning company post, for jobs.
    pub parent_id: Option<String>,
    pub user_id: String,
    pub title: String,
    pub slug: String,
    pub body: String,
    pub location_name: String,
    pub country_name: String,
    pub types: Vec<String>,
    pub regions: Vec<String>,
    pub tags: Vec<String>,
    pub status: PostStatus,
    pub featured: bool,
    pub image: Option<String>,
    /// Event-style items carry a start/end; listings usually have neither.
    pub dates_start: Option<DateTime<Utc>>,
    pub dates_end: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub sleep_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`crate::ContentStore::insert`]. Posts start as drafts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub kind: PostKind,
    pub parent_id: Option<String>,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub location_name: String,
    #[serde(default)]
    pub country_name: String,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub featured: bool,
    pub image: Option<String>,
    pub dates_start: Option<DateTime<Utc>>,
    pub dates_end: Option<DateTime<Utc>>,
}

impl NewPost {
    pub fn new(kind: PostKind, user_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind,
            parent_id: None,
            user_id: user_id.into(),
            title: title.into(),
            body: String::new(),
            location_name: String::new(),
            country_name: String::new(),
            types: Vec::new(),
            regions: Vec::new(),
            tags: Vec::new(),
            featured: false,
            image: None,
            dates_start: None,
            dates_end: None,
        }
    }
}

/// The company record shown next to a job in digests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentSummary {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub image: Option<String>,
}

/// One search result: the item plus its parent company, when it has one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub post: Post,
    pub parent: Option<ParentSummary>,
}
