use crate::catalog::cache::CatalogQueryKey;
use crate::catalog::types::{Category, Product};
use crate::catalog::CachedCatalogClient;
use crate::commands;
use crate::config::Config;
use crate::debounce::Debouncer;
use crate::error::CatalogError;
use crate::event::{Event, EventHandler};
use crate::filters::{FilterState, FilterStore, ProductListBinding};
use crate::query::Subscription;
use crate::render;
use crate::session::store::ClientStore;
use crate::session::{Session, SessionManager};
use color_eyre::Result;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Application state shared by every command.
///
/// Owns the session, the cached API client (and through it the query cache)
/// and the filter store. Built once per process with [`App::init`].
pub struct App {
  config: Config,
  session: SessionManager,
  api: CachedCatalogClient,
  filters: FilterStore,
}

impl App {
  /// Wire up components and restore any persisted session.
  pub fn init(config: Config, store: Arc<dyn ClientStore>) -> Result<Self> {
    let session = SessionManager::new(store, config.api.production);
    let api = CachedCatalogClient::new(&config, session.handle())?;
    let filters = FilterStore::new(FilterState::with_limit(config.filters.default_limit));

    let restored = session.initialize_auth()?;
    info!(
      api = %api.client().base_url(),
      authenticated = restored.is_authenticated(),
      "app initialized"
    );

    Ok(Self {
      config,
      session,
      api,
      filters,
    })
  }

  /// Drop cached data and stop pending timers.
  pub fn teardown(&self) {
    self.api.reset();
    info!("app torn down");
  }

  pub fn api(&self) -> &CachedCatalogClient {
    &self.api
  }

  pub fn filters(&self) -> &FilterStore {
    &self.filters
  }

  pub fn session(&self) -> Session {
    self.session.session()
  }

  pub fn require_session(&self) -> Result<Session, CatalogError> {
    let session = self.session.session();
    if session.is_authenticated() {
      Ok(session)
    } else {
      Err(CatalogError::Auth(
        "Not signed in. Run `catadm login <email>` first".to_string(),
      ))
    }
  }

  /// Sign in. Nothing cached under a previous identity survives.
  pub async fn login(&self, email: &str) -> Result<Session, CatalogError> {
    let session = self.session.authenticate(self.api.client(), email).await?;
    self.api.reset();
    Ok(session)
  }

  /// Sign out and forget everything fetched with the old token.
  pub fn logout(&self) -> Result<(), CatalogError> {
    self.session.logout()?;
    self.api.reset();
    Ok(())
  }

  /// Interactive product browser on stdin/stdout.
  pub async fn browse(&self) -> Result<()> {
    self.require_session()?;
    let events = EventHandler::new(Duration::from_millis(100));
    let mut out = std::io::stdout();
    self.browse_with(events, &mut out).await
  }

  pub async fn browse_with(&self, mut events: EventHandler, out: &mut dyn Write) -> Result<()> {
    let mut browser = Browser::new(self);
    browser.start(out)?;

    while !browser.should_quit {
      match events.next().await {
        Some(Event::Line(line)) => browser.handle_line(&line, out).await?,
        Some(Event::Tick) => browser.tick(out)?,
        Some(Event::Eof) | None => break,
      }
    }
    browser.finish(out).await
  }
}

/// State of one browse session
struct Browser<'a> {
  app: &'a App,
  search: Debouncer<String>,
  filter_rx: watch::Receiver<FilterState>,
  list: ProductListBinding,
  detail: Option<Subscription<Product>>,
  categories: Option<Subscription<Vec<Category>>>,
  /// `delete` was issued and awaits `yes`/`no`
  confirming_delete: bool,
  should_quit: bool,
}

impl<'a> Browser<'a> {
  fn new(app: &'a App) -> Self {
    let store = app.filters.clone();
    let search = Debouncer::new(app.config.filters.search_debounce(), move |term: String| {
      store.set_search_term(&term);
    });
    let mut filter_rx = app.filters.subscribe();
    let state = filter_rx.borrow_and_update().clone();

    Self {
      app,
      search,
      filter_rx,
      list: ProductListBinding::new(app.api.clone(), &state),
      detail: None,
      categories: None,
      confirming_delete: false,
      should_quit: false,
    }
  }

  fn start(&mut self, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "{}", render::session_line(&self.app.session()))?;
    writeln!(out, "Type `help` for commands.")?;
    self.print_list(out)
  }

  fn print_list(&self, out: &mut dyn Write) -> Result<()> {
    let filters = &self.app.filters;
    let list = self.list.subscription();
    let mut summary = render::filter_summary(&filters.snapshot(), filters.default_limit());
    if let Some(freshness) = render::freshness(list.fetched_at(), list.is_stale()) {
      summary = format!("{} | {}", summary, freshness);
    }
    writeln!(out, "-- {}", summary)?;
    write!(
      out,
      "{}",
      render::query_state(list.state(), |p| render::product_table(p))
    )?;
    Ok(())
  }

  /// Commit a search still waiting out its debounce window, so typed input is not lost on exit.
  async fn finish(&mut self, out: &mut dyn Write) -> Result<()> {
    if !self.search.flush() {
      return Ok(());
    }
    let state = self.filter_rx.borrow_and_update().clone();
    if self.list.sync(&state) {
      self.list.subscription_mut().settled().await;
      self.print_list(out)?;
    }
    Ok(())
  }

  /// Apply committed filter changes and print query updates.
  fn tick(&mut self, out: &mut dyn Write) -> Result<()> {
    if self.filter_rx.has_changed().unwrap_or(false) {
      let state = self.filter_rx.borrow_and_update().clone();
      if self.list.sync(&state) {
        self.print_list(out)?;
      }
    }

    if self.list.subscription_mut().poll() {
      self.print_list(out)?;
    }

    if let Some(detail) = self.detail.as_mut() {
      if detail.poll() {
        write!(out, "{}", render::query_state(detail.state(), render::product_detail))?;
      }
    }

    if let Some(categories) = self.categories.as_mut() {
      if categories.poll() {
        write!(
          out,
          "{}",
          render::query_state(categories.state(), |c| render::category_table(c))
        )?;
      }
    }
    Ok(())
  }

  async fn handle_line(&mut self, line: &str, out: &mut dyn Write) -> Result<()> {
    if line.trim().is_empty() {
      return Ok(());
    }
    let Some((cmd, arg)) = commands::parse(line) else {
      writeln!(out, "Unknown command: {}. Type `help` for commands.", line.trim())?;
      return Ok(());
    };

    let confirming = std::mem::take(&mut self.confirming_delete);
    let app = self.app;
    let filters = &app.filters;

    match cmd.name {
      "search" => self.search.input(arg.to_string()),
      "category" => {
        filters.set_category(Some(arg));
      }
      "limit" => match arg.parse::<u32>() {
        Ok(limit) => {
          filters.set_limit(limit);
        }
        Err(_) => writeln!(out, "Usage: {}", cmd.usage)?,
      },
      "next" => {
        if !filters.next_page() {
          writeln!(out, "Showing all results; there are no pages.")?;
        }
      }
      "prev" => {
        if !filters.prev_page() {
          writeln!(out, "Already on the first page.")?;
        }
      }
      "clear" => {
        self.search.cancel();
        filters.clear_all();
      }
      "open" if !arg.is_empty() => {
        filters.select_product(Some(arg));
        let detail = app.api.product(arg);
        write!(out, "{}", render::query_state(detail.state(), render::product_detail))?;
        self.detail = Some(detail);
      }
      "delete" if !arg.is_empty() => {
        filters.select_product(Some(arg));
        self.confirming_delete = true;
        writeln!(out, "Delete product {}? Type `yes` to confirm or `no` to abort.", arg)?;
      }
      "yes" => match filters.snapshot().selected_product_id {
        Some(id) if confirming => match app.api.delete_product(&id).await {
          Ok(response) => {
            filters.select_product(None);
            let message = if response.message.is_empty() {
              format!("Deleted product {}", id)
            } else {
              response.message
            };
            writeln!(out, "{}", message)?;
          }
          Err(e) => writeln!(out, "{}", render::error_line(&e.into()))?,
        },
        _ => writeln!(out, "Nothing to confirm.")?,
      },
      "no" => {
        if confirming {
          filters.select_product(None);
          writeln!(out, "Deletion aborted.")?;
        }
      }
      "refresh" => {
        self.list.subscription().refetch();
      }
      "info" => {
        let key = CatalogQueryKey::Products(self.list.args().clone());
        let info = app.api.cache().entry_info(&key);
        write!(out, "{}", render::entry_info(info.as_ref()))?;
      }
      "categories" => {
        let categories = app.api.categories();
        write!(
          out,
          "{}",
          render::query_state(categories.state(), |c| render::category_table(c))
        )?;
        self.categories = Some(categories);
      }
      "help" => write!(out, "{}", render::help())?,
      "quit" => self.should_quit = true,
      _ => writeln!(out, "Usage: {}", cmd.usage)?,
    }

    self.tick(out)
  }
}
