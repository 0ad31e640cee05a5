use tracing::{debug, warn};

use crate::error::Result;
use crate::filter::{self, FilterPlan};
use crate::gateway::{ReportGateway, ReportPage};
use crate::models::ReportRow;

pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    /// Initial mount or filter change.
    Reset,
    /// Pull-to-refresh over an already loaded list.
    Refresh,
    /// Next page appended to the accumulated list.
    More,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagerState {
    Idle,
    Loading,
    Refreshing,
    LoadingMore,
    Loaded,
}

/// One outstanding page request. Results are only applied if the ticket's
/// generation is still current when they arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTicket {
    generation: u64,
    kind: LoadKind,
    plan: FilterPlan,
    offset: usize,
    limit: usize,
}

impl PageTicket {
    pub fn kind(&self) -> LoadKind {
        self.kind
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub async fn fetch<G>(&self, gateway: &G) -> Result<ReportPage>
    where
        G: ReportGateway + ?Sized,
    {
        if self.plan.empty {
            return Ok(ReportPage::default());
        }
        let page = gateway
            .query_reports(&self.plan.query(self.limit, self.offset))
            .await?;
        Ok(ReportPage {
            rows: self.plan.apply(page.rows),
            has_more: page.has_more,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    Applied { rows: usize, has_more: bool },
    Stale,
}

/// Offset-paged accumulation of report rows for one list screen.
#[derive(Debug)]
pub struct ReportPager {
    page_size: usize,
    plan: Option<FilterPlan>,
    rows: Vec<ReportRow>,
    pages_loaded: usize,
    has_more: bool,
    generation: u64,
    in_flight: Option<PageTicket>,
    state: PagerState,
}

impl Default for ReportPager {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl ReportPager {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            plan: None,
            rows: Vec::new(),
            pages_loaded: 0,
            has_more: true,
            generation: 0,
            in_flight: None,
            state: PagerState::Idle,
        }
    }

    pub fn state(&self) -> PagerState {
        self.state
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn pages_loaded(&self) -> usize {
        self.pages_loaded
    }

    /// Accumulated rows narrowed by the free-text search box.
    pub fn visible(&self, query: &str) -> Vec<&ReportRow> {
        filter::search(&self.rows, query)
    }

    /// Starts a reset or refresh. Any request already in flight becomes stale.
    /// The new plan only takes over once its first page has been applied.
    pub fn begin_reset(&mut self, plan: FilterPlan, kind: LoadKind) -> PageTicket {
        self.generation += 1;
        let ticket = PageTicket {
            generation: self.generation,
            kind,
            plan,
            offset: 0,
            limit: self.page_size,
        };
        if let Some(previous) = self.in_flight.replace(ticket) {
            debug!(kind = ?previous.kind, offset = previous.offset, "superseding in-flight page load");
        }
        self.state = match kind {
            LoadKind::Refresh if self.state == PagerState::Loaded => PagerState::Refreshing,
            _ => PagerState::Loading,
        };
        ticket
    }

    /// Returns `None` while another load is in flight, once the gateway has
    /// run out of rows, or before the first reset.
    pub fn begin_more(&mut self) -> Option<PageTicket> {
        if self.in_flight.is_some() || !self.has_more {
            return None;
        }
        let plan = self.plan?;
        let ticket = PageTicket {
            generation: self.generation,
            kind: LoadKind::More,
            plan,
            offset: self.pages_loaded * self.page_size,
            limit: self.page_size,
        };
        self.in_flight = Some(ticket);
        self.state = PagerState::LoadingMore;
        Some(ticket)
    }

    pub fn complete(&mut self, ticket: PageTicket, result: Result<ReportPage>) -> Result<PageOutcome> {
        if ticket.generation != self.generation || self.in_flight != Some(ticket) {
            match &result {
                Ok(page) => debug!(
                    kind = ?ticket.kind,
                    offset = ticket.offset,
                    rows = page.rows.len(),
                    "discarding stale page"
                ),
                Err(err) => debug!(kind = ?ticket.kind, error = %err, "discarding stale page failure"),
            }
            return Ok(PageOutcome::Stale);
        }
        self.in_flight = None;

        let page = match result {
            Ok(page) => page,
            Err(err) => {
                warn!(kind = ?ticket.kind, offset = ticket.offset, error = %err, "page load failed");
                self.state = if self.pages_loaded > 0 {
                    PagerState::Loaded
                } else {
                    PagerState::Idle
                };
                return Err(err);
            }
        };

        let rows = page.rows.len();
        match ticket.kind {
            LoadKind::Reset | LoadKind::Refresh => {
                self.plan = Some(ticket.plan);
                self.rows = page.rows;
                self.pages_loaded = 1;
            }
            LoadKind::More => {
                self.rows.extend(page.rows);
                self.pages_loaded += 1;
            }
        }
        self.has_more = page.has_more;
        self.state = PagerState::Loaded;
        debug!(
            kind = ?ticket.kind,
            rows,
            total = self.rows.len(),
            has_more = self.has_more,
            "page applied"
        );
        Ok(PageOutcome::Applied {
            rows,
            has_more: self.has_more,
        })
    }

    pub async fn reset<G>(&mut self, gateway: &G, plan: FilterPlan, kind: LoadKind) -> Result<PageOutcome>
    where
        G: ReportGateway + ?Sized,
    {
        let ticket = self.begin_reset(plan, kind);
        let result = ticket.fetch(gateway).await;
        self.complete(ticket, result)
    }

    /// `Ok(None)` when the request was suppressed.
    pub async fn load_more<G>(&mut self, gateway: &G) -> Result<Option<PageOutcome>>
    where
        G: ReportGateway + ?Sized,
    {
        let Some(ticket) = self.begin_more() else {
            return Ok(None);
        };
        let result = ticket.fetch(gateway).await;
        self.complete(ticket, result).map(Some)
    }
}
