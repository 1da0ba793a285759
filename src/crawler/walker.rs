//! Pagination walker
//!
//! Walks the pages of one category in order. The walk is an explicit state
//! machine: a pending page (URL and 1-based index) or a terminal reason.

use crate::config::SiteProfile;
use crate::crawler::extractor::extract_page;
use crate::crawler::fetcher::Fetcher;
use crate::state::{Category, ImageRecord};
use crate::url::query_param;
use crate::FetchError;
use std::collections::HashSet;
use std::fmt;
use url::Url;

/// Why the walk of a category stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The last page had images and no next link
    LastPage,
    /// The last page had neither images nor a next link; coverage may be incomplete
    EmptyLastPage,
    /// `max-pages-per-category` was reached
    PageLimit,
    /// The next link pointed into another category
    LeftCategory,
    /// The next link pointed at a page already walked
    Cycle,
    /// A page could not be fetched after all retries
    FetchFailed,
    /// The crawl was cancelled
    Cancelled,
}

impl Termination {
    /// Returns true if the walk may have missed pages without noticing
    pub fn is_low_confidence(&self) -> bool {
        matches!(self, Self::EmptyLastPage)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LastPage => "last page",
            Self::EmptyLastPage => "empty last page",
            Self::PageLimit => "page limit",
            Self::LeftCategory => "left category",
            Self::Cycle => "cycle",
            Self::FetchFailed => "fetch failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One page of a category, as handed to the coordinator
#[derive(Debug, Clone)]
pub struct WalkedPage {
    pub url: Url,
    pub page_index: u32,
    pub page_title: String,
    /// Images on the allowed domain, in page order
    pub images: Vec<ImageRecord>,
    /// Images dropped for being outside the allowed domain
    pub rejected: usize,
}

#[derive(Debug, Clone)]
enum WalkState {
    Pending { url: Url, page_index: u32 },
    Done(Termination),
}

/// Walks the pages of one category
pub struct PaginationWalker<'a> {
    fetcher: &'a Fetcher,
    profile: &'a SiteProfile,
    category: &'a Category,
    max_pages: Option<u32>,
    state: WalkState,
    visited: HashSet<String>,
}

impl<'a> PaginationWalker<'a> {
    pub fn new(
        fetcher: &'a Fetcher,
        profile: &'a SiteProfile,
        category: &'a Category,
        max_pages: Option<u32>,
    ) -> Self {
        Self {
            fetcher,
            profile,
            category,
            max_pages,
            state: WalkState::Pending {
                url: category.landing_url.clone(),
                page_index: 1,
            },
            visited: HashSet::new(),
        }
    }

    /// The terminal reason, once the walk is over
    pub fn termination(&self) -> Option<Termination> {
        match self.state {
            WalkState::Done(termination) => Some(termination),
            WalkState::Pending { .. } => None,
        }
    }

    /// Fetches and extracts the next page
    ///
    /// Returns None once the walk is over; `termination` then tells why.
    pub async fn next_page(&mut self) -> Option<WalkedPage> {
        let (url, page_index) = match &self.state {
            WalkState::Pending { url, page_index } => (url.clone(), *page_index),
            WalkState::Done(_) => return None,
        };

        if self.fetcher.is_cancelled() {
            self.state = WalkState::Done(Termination::Cancelled);
            return None;
        }

        self.visited.insert(url.as_str().to_string());

        let html = match self.fetcher.fetch_text(&url).await {
            Ok(html) => html,
            Err(FetchError::Cancelled { .. }) => {
                self.state = WalkState::Done(Termination::Cancelled);
                return None;
            }
            Err(e) => {
                tracing::warn!(
                    "Category '{}' ends at page {}: {}",
                    self.category.label,
                    page_index,
                    e
                );
                self.state = WalkState::Done(Termination::FetchFailed);
                return None;
            }
        };

        let extraction = extract_page(&html, &url, page_index, self.profile);

        let guard = self.fetcher.guard();
        let (images, off_domain): (Vec<_>, Vec<_>) =
            extraction.images.into_iter().partition(|image| {
                Url::parse(&image.original_url)
                    .map(|u| guard.is_allowed(&u))
                    .unwrap_or(false)
            });
        for image in &off_domain {
            tracing::debug!("Dropping off-domain image {}", image.original_url);
        }

        self.state = self.transition(page_index, extraction.next_page_url, images.is_empty());

        tracing::info!(
            "Category '{}' page {}: {} images",
            self.category.label,
            page_index,
            images.len()
        );

        Some(WalkedPage {
            url,
            page_index,
            page_title: extraction.page_title,
            images,
            rejected: off_domain.len(),
        })
    }

    fn transition(&self, page_index: u32, next: Option<Url>, page_empty: bool) -> WalkState {
        let Some(next) = next else {
            if page_empty {
                tracing::warn!(
                    "Category '{}' ended on page {} with no images and no next link",
                    self.category.label,
                    page_index
                );
                return WalkState::Done(Termination::EmptyLastPage);
            }
            return WalkState::Done(Termination::LastPage);
        };

        if self.visited.contains(next.as_str()) {
            return WalkState::Done(Termination::Cycle);
        }

        if !self.same_category(&next) {
            tracing::debug!(
                "Next link {} leaves category '{}'",
                next,
                self.category.label
            );
            return WalkState::Done(Termination::LeftCategory);
        }

        if self.max_pages.is_some_and(|max| page_index >= max) {
            return WalkState::Done(Termination::PageLimit);
        }

        WalkState::Pending {
            url: next,
            page_index: page_index + 1,
        }
    }

    fn same_category(&self, url: &Url) -> bool {
        if !self.fetcher.guard().is_allowed(url) {
            return false;
        }

        match &self.profile.category_param {
            Some(param) => query_param(url, param).as_deref() == Some(self.category.id.as_str()),
            None => url.path() == self.category.landing_url.path(),
        }
    }
}

/// Walks a whole category, collecting every page
pub async fn walk_category(
    fetcher: &Fetcher,
    profile: &SiteProfile,
    category: &Category,
    max_pages: Option<u32>,
) -> (Vec<WalkedPage>, Termination) {
    let mut walker = PaginationWalker::new(fetcher, profile, category, max_pages);
    let mut pages = Vec::new();
    while let Some(page) = walker.next_page().await {
        pages.push(page);
    }
    let termination = walker.termination().unwrap_or(Termination::LastPage);
    (pages, termination)
}
