//! One coordinator per resource kind, built once per session
//!
//! The registry is the only place that knows how a kind is fetched: every
//! fetch function goes through the `ContentSource` and the JSON envelope
//! parser. Consumers get accessors from it and never see fetch functions.
//!
//! Passed around explicitly (usually behind an `Arc`); there is no global
//! instance.

use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info};

use super::accessor::ResourceAccessor;
use super::coordinator::RequestCoordinator;
use super::stats::StatsSnapshot;
use super::workers::Workers;
use crate::config::RegistryConfig;
use crate::entities::decode::decode_ugoira;
use crate::entities::frame::FrameSequence;
use crate::entities::keys::{IllustId, ImageUrl, SelfTags, UserId};
use crate::entities::records::{AccountTag, BookmarkForm, Illust, Page, Pages, TagStats, UgoiraMeta, User};
use crate::entities::traits::{FailureReporter, WorkerPool};
use crate::error::{FetchError, PreconditionError};
use crate::source::{ContentSource, Request, parse_body, parse_json};

pub struct ResourceRegistry {
    pages: RequestCoordinator<IllustId, Pages>,
    ugoira: RequestCoordinator<IllustId, FrameSequence>,
    illust: RequestCoordinator<IllustId, Illust>,
    user: RequestCoordinator<UserId, User>,
    bookmark_form: RequestCoordinator<IllustId, BookmarkForm>,
    user_tags: RequestCoordinator<SelfTags, Vec<AccountTag>>,
    images: RequestCoordinator<ImageUrl, ImageUrl>,
}

impl ResourceRegistry {
    /// Build with a dedicated fetch pool of `config.workers` threads.
    pub fn new(source: Arc<dyn ContentSource>, config: &RegistryConfig, reporter: Arc<dyn FailureReporter>) -> Self {
        let pool: Arc<dyn WorkerPool> = Arc::new(Workers::new(config.workers));
        Self::with_pool(source, config, pool, reporter)
    }

    /// Build on an existing pool.
    pub fn with_pool(
        source: Arc<dyn ContentSource>,
        config: &RegistryConfig,
        pool: Arc<dyn WorkerPool>,
        reporter: Arc<dyn FailureReporter>,
    ) -> Self {
        let src = Arc::clone(&source);
        let pages: RequestCoordinator<IllustId, Pages> = RequestCoordinator::new(
            "pages",
            config.pages,
            Arc::clone(&pool),
            Arc::clone(&reporter),
            move |id: &IllustId| {
                let pages: Vec<Page> = parse_body(&src.get(&Request::IllustPages(id.clone()))?)?;
                if pages.is_empty() {
                    return Err(FetchError::decode(format!("illust {} has no pages", id)));
                }
                Ok(Pages::from_pages(pages))
            },
        );

        let src = Arc::clone(&source);
        let ugoira: RequestCoordinator<IllustId, FrameSequence> = RequestCoordinator::new(
            "ugoira",
            config.ugoira,
            Arc::clone(&pool),
            Arc::clone(&reporter),
            move |id: &IllustId| {
                let meta: UgoiraMeta = parse_body(&src.get(&Request::UgoiraMeta(id.clone()))?)?;
                let archive = src.get(&Request::Archive(ImageUrl::new(meta.src.clone())))?;
                decode_ugoira(&meta, &archive)
            },
        );

        let src = Arc::clone(&source);
        let illust: RequestCoordinator<IllustId, Illust> = RequestCoordinator::new(
            "illust",
            config.illust,
            Arc::clone(&pool),
            Arc::clone(&reporter),
            move |id: &IllustId| {
                parse_body(&src.get(&Request::Illust(id.clone()))?)
            },
        );

        let src = Arc::clone(&source);
        let user: RequestCoordinator<UserId, User> = RequestCoordinator::new(
            "user",
            config.user,
            Arc::clone(&pool),
            Arc::clone(&reporter),
            move |id: &UserId| {
                parse_body(&src.get(&Request::User(id.clone()))?)
            },
        );

        let src = Arc::clone(&source);
        let bookmark_form: RequestCoordinator<IllustId, BookmarkForm> = RequestCoordinator::new(
            "bookmark_form",
            config.bookmark_form,
            Arc::clone(&pool),
            Arc::clone(&reporter),
            move |id: &IllustId| {
                parse_json(&src.get(&Request::BookmarkForm(id.clone()))?)
            },
        );

        let src = Arc::clone(&source);
        let user_tags: RequestCoordinator<SelfTags, Vec<AccountTag>> = RequestCoordinator::new(
            "user_tags",
            config.user_tags,
            Arc::clone(&pool),
            Arc::clone(&reporter),
            move |_: &SelfTags| {
                let map: IndexMap<String, TagStats> = parse_json(&src.get(&Request::SelfTags)?)?;
                Ok(AccountTag::from_map(map))
            },
        );

        // Resolves to the URL once the bytes are known to be an image
        let src = Arc::clone(&source);
        let images: RequestCoordinator<ImageUrl, ImageUrl> = RequestCoordinator::new(
            "images",
            config.images,
            Arc::clone(&pool),
            Arc::clone(&reporter),
            move |url: &ImageUrl| {
                let bytes = src.get(&Request::Image(url.clone()))?;
                image::guess_format(&bytes).map_err(|_| FetchError::decode(format!("not an image: {}", url)))?;
                Ok(url.clone())
            },
        );

        info!("ResourceRegistry ready ({} workers configured)", config.workers);

        Self {
            pages,
            ugoira,
            illust,
            user,
            bookmark_form,
            user_tags,
            images,
        }
    }

    pub fn pages(&self, id: IllustId) -> Result<ResourceAccessor<IllustId, Pages>, PreconditionError> {
        ResourceAccessor::new(self.pages.clone(), id)
    }

    /// Decoded animation frames
    pub fn ugoira(&self, id: IllustId) -> Result<ResourceAccessor<IllustId, FrameSequence>, PreconditionError> {
        ResourceAccessor::new(self.ugoira.clone(), id)
    }

    pub fn illust(&self, id: IllustId) -> Result<ResourceAccessor<IllustId, Illust>, PreconditionError> {
        ResourceAccessor::new(self.illust.clone(), id)
    }

    pub fn user(&self, id: UserId) -> Result<ResourceAccessor<UserId, User>, PreconditionError> {
        ResourceAccessor::new(self.user.clone(), id)
    }

    /// Refetched on every new accessor
    pub fn bookmark_form(&self, id: IllustId) -> Result<ResourceAccessor<IllustId, BookmarkForm>, PreconditionError> {
        ResourceAccessor::new(self.bookmark_form.clone(), id)
    }

    pub fn user_tags(&self) -> Result<ResourceAccessor<SelfTags, Vec<AccountTag>>, PreconditionError> {
        ResourceAccessor::new(self.user_tags.clone(), SelfTags)
    }

    pub fn image(&self, url: ImageUrl) -> Result<ResourceAccessor<ImageUrl, ImageUrl>, PreconditionError> {
        ResourceAccessor::new(self.images.clone(), url)
    }

    /// Counters per kind, in registry order
    pub fn stats(&self) -> Vec<(&'static str, StatsSnapshot)> {
        vec![
            (self.pages.name(), self.pages.stats().snapshot()),
            (self.ugoira.name(), self.ugoira.stats().snapshot()),
            (self.illust.name(), self.illust.stats().snapshot()),
            (self.user.name(), self.user.stats().snapshot()),
            (self.bookmark_form.name(), self.bookmark_form.stats().snapshot()),
            (self.user_tags.name(), self.user_tags.stats().snapshot()),
            (self.images.name(), self.images.stats().snapshot()),
        ]
    }

    /// Drop every settled entry of every kind
    pub fn clear(&self) {
        self.pages.clear();
        self.ugoira.clear();
        self.illust.clear();
        self.user.clear();
        self.bookmark_form.clear();
        self.user_tags.clear();
        self.images.clear();
        debug!("ResourceRegistry cleared");
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("pages", &self.pages.len())
            .field("ugoira", &self.ugoira.len())
            .field("illust", &self.illust.len())
            .field("user", &self.user.len())
            .field("bookmark_form", &self.bookmark_form.len())
            .field("user_tags", &self.user_tags.len())
            .field("images", &self.images.len())
            .finish()
    }
}
