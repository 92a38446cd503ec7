//! Remote record types
//!
//! Shapes of the JSON bodies returned by the content source. Field names
//! follow the wire format (camelCase); only fields the viewer reads are
//! declared, everything else is ignored by serde.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::keys::{IllustId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageUrls {
    pub thumb_mini: String,
    pub small: String,
    pub regular: String,
    pub original: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub urls: PageUrls,
    pub width: u32,
    pub height: u32,
}

/// Page list of one artwork plus derived facts
#[derive(Debug, Clone, PartialEq)]
pub struct Pages {
    pub pages: Vec<Page>,
    pub count: usize,
    /// Animated artworks publish a single `..._ugoira0...` page
    pub is_ugoira: bool,
}

impl Pages {
    pub fn from_pages(pages: Vec<Page>) -> Self {
        let is_ugoira = pages
            .first()
            .map(|p| p.urls.original.contains("ugoira0"))
            .unwrap_or(false);
        Self {
            count: pages.len(),
            pages,
            is_ugoira,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkData {
    pub id: String,
    pub private: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Illust {
    pub illust_id: IllustId,
    pub illust_title: String,
    #[serde(default)]
    pub illust_comment: String,
    /// 0 illustration, 1 manga, 2 ugoira
    #[serde(default)]
    pub illust_type: u8,
    pub user_id: UserId,
    pub user_name: String,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub like_count: u32,
    #[serde(default)]
    pub bookmark_count: u32,
    #[serde(default)]
    pub view_count: u32,
    #[serde(default)]
    pub like_data: bool,
    #[serde(default)]
    pub bookmark_data: Option<BookmarkData>,
    #[serde(default = "default_true")]
    pub is_bookmarkable: bool,
    #[serde(default)]
    pub create_date: String,
}

fn default_true() -> bool {
    true
}

impl Illust {
    pub fn is_ugoira(&self) -> bool {
        self.illust_type == 2
    }

    pub fn is_bookmarked(&self) -> bool {
        self.bookmark_data.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub image_big: String,
    #[serde(default)]
    pub is_followed: bool,
    #[serde(default)]
    pub premium: bool,
}

/// Current bookmark settings of one artwork. Always refetched: the server
/// side changes whenever the user bookmarks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkForm {
    #[serde(default)]
    pub comment: String,
    /// Space separated tag list
    #[serde(default)]
    pub tags: String,
    /// 0 public, 1 private
    #[serde(default)]
    pub restrict: u8,
}

impl BookmarkForm {
    pub fn tag_list(&self) -> Vec<&str> {
        self.tags.split_whitespace().collect()
    }

    pub fn is_private(&self) -> bool {
        self.restrict == 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagStats {
    pub lev: u32,
    pub total: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTag {
    pub name: String,
    pub lev: u32,
    pub total: u32,
}

impl AccountTag {
    /// Flatten `{ "<name>": { lev, total }, ... }` keeping server order
    pub fn from_map(map: IndexMap<String, TagStats>) -> Vec<AccountTag> {
        map.into_iter()
            .map(|(name, stats)| AccountTag {
                name,
                lev: stats.lev,
                total: stats.total,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UgoiraFrameMeta {
    pub file: String,
    pub delay: u32,
}

/// Animation descriptor: where the frame archive lives and frame timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UgoiraMeta {
    pub src: String,
    #[serde(default)]
    pub original_src: String,
    #[serde(default, rename = "mime_type")]
    pub mime_type: String,
    pub frames: Vec<UgoiraFrameMeta>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(original: &str) -> Page {
        Page {
            urls: PageUrls {
                thumb_mini: String::new(),
                small: String::new(),
                regular: String::new(),
                original: original.to_string(),
            },
            width: 10,
            height: 10,
        }
    }

    #[test]
    fn test_pages_detect_ugoira() {
        let p = Pages::from_pages(vec![page("https://i/img/1_ugoira0.jpg")]);
        assert!(p.is_ugoira);
        assert_eq!(p.count, 1);

        let p = Pages::from_pages(vec![page("https://i/img/1_p0.jpg"), page("https://i/img/1_p1.jpg")]);
        assert!(!p.is_ugoira);
        assert_eq!(p.count, 2);

        assert!(!Pages::from_pages(Vec::new()).is_ugoira);
    }

    #[test]
    fn test_illust_defaults() {
        let json = r#"{
            "illustId": "10", "illustTitle": "t", "userId": "3", "userName": "u",
            "illustType": 2, "bookmarkData": {"id": "99", "private": false}
        }"#;
        let illust: Illust = serde_json::from_str(json).unwrap();
        assert!(illust.is_ugoira());
        assert!(illust.is_bookmarked());
        assert!(illust.is_bookmarkable);
        assert!(!illust.like_data);
    }

    #[test]
    fn test_account_tags_keep_server_order() {
        let map: IndexMap<String, TagStats> =
            serde_json::from_str(r#"{"b": {"lev": 1, "total": 5}, "a": {"lev": 2, "total": 9}, "c": {"lev": 1, "total": 1}}"#)
                .unwrap();
        let tags = AccountTag::from_map(map);
        assert_eq!(tags.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), ["b", "a", "c"]);
        assert_eq!(tags[1], AccountTag { name: "a".into(), lev: 2, total: 9 });
    }

    #[test]
    fn test_bookmark_form_tags() {
        let form = BookmarkForm {
            comment: String::new(),
            tags: "風景  オリジナル".to_string(),
            restrict: 1,
        };
        assert_eq!(form.tag_list(), vec!["風景", "オリジナル"]);
        assert!(form.is_private());
    }
}
