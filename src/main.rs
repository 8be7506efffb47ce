mod app;
mod cache;
mod catalog;
mod commands;
mod config;
mod debounce;
mod error;
mod event;
mod filters;
mod logging;
mod query;
mod render;
mod session;
mod validation;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;

use app::App;
use error::CatalogError;
use query::Subscription;
use session::store::{ClientStore, MemoryStore, SqliteStore};
use validation::{CategoryForm, ProductForm, ProductPatch};

#[derive(Parser, Debug)]
#[command(name = "catadm")]
#[command(about = "Admin client for a product catalog REST API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/catadm/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Catalog API base URL (overrides config and CATADM_API_URL)
  #[arg(long)]
  api_url: Option<String>,

  /// Keep the session in memory only; nothing is persisted
  #[arg(long)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Sign in with an email address
  Login { email: String },
  /// Sign out and forget the stored session
  Logout,
  /// Show the current session
  Whoami,
  /// Manage products
  #[command(subcommand)]
  Products(ProductCommand),
  /// Manage categories
  #[command(subcommand)]
  Categories(CategoryCommand),
  /// Browse products interactively
  Browse,
}

#[derive(Subcommand, Debug)]
enum ProductCommand {
  /// List products
  List {
    #[arg(short, long)]
    search: Option<String>,
    /// Category id
    #[arg(short, long)]
    category: Option<String>,
    /// Page size, 0 for all
    #[arg(short, long)]
    limit: Option<u32>,
    #[arg(short, long)]
    offset: Option<u32>,
  },
  /// Show one product
  Show { id: String },
  /// Create a product
  Create {
    #[arg(long)]
    name: String,
    #[arg(long)]
    price: String,
    #[arg(long)]
    description: String,
    /// Category id
    #[arg(long)]
    category: String,
    /// Image URL, repeatable
    #[arg(long = "image")]
    images: Vec<String>,
  },
  /// Update fields of a product
  Update {
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    price: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    category: Option<String>,
    /// Replaces all images, repeatable
    #[arg(long = "image")]
    images: Vec<String>,
  },
  /// Delete a product
  Delete { id: String },
}

#[derive(Subcommand, Debug)]
enum CategoryCommand {
  /// List categories
  List,
  /// Show one category
  Show { id: String },
  /// Create a category
  Create {
    #[arg(long)]
    name: String,
    #[arg(long)]
    description: Option<String>,
  },
  /// Update a category
  Update {
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    description: Option<String>,
  },
  /// Delete a category
  Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?.with_api_url(args.api_url);
  let _log_guard = logging::init(&config)?;

  let store: Arc<dyn ClientStore> = if args.ephemeral {
    Arc::new(MemoryStore::new())
  } else {
    Arc::new(SqliteStore::open_default()?)
  };

  let app = App::init(config, store)?;
  let result = run(&app, args.command).await;
  app.teardown();

  result
}

async fn run(app: &App, command: Command) -> Result<()> {
  match command {
    Command::Login { email } => {
      let session = app.login(&email).await?;
      println!("{}", render::session_line(&session));
    }
    Command::Logout => {
      app.logout()?;
      println!("Signed out");
    }
    Command::Whoami => println!("{}", render::session_line(&app.session())),
    Command::Browse => app.browse().await?,
    Command::Products(cmd) => {
      app.require_session()?;
      products(app, cmd).await?;
    }
    Command::Categories(cmd) => {
      app.require_session()?;
      categories(app, cmd).await?;
    }
  }
  Ok(())
}

async fn products(app: &App, cmd: ProductCommand) -> Result<()> {
  let api = app.api();
  match cmd {
    ProductCommand::List {
      search,
      category,
      limit,
      offset,
    } => {
      let filters = app.filters();
      if let Some(search) = search {
        filters.set_search_term(&search);
      }
      filters.set_category(category.as_deref());
      if let Some(limit) = limit {
        filters.set_limit(limit);
      }
      if let Some(offset) = offset {
        filters.set_offset(offset);
      }

      let state = filters.snapshot();
      println!(
        "-- {}",
        render::filter_summary(&state, filters.default_limit())
      );
      print_settled(&mut api.products(state.list_args()), |p| render::product_table(p)).await?;
    }
    ProductCommand::Show { id } => {
      print_settled(&mut api.product(&id), render::product_detail).await?;
    }
    ProductCommand::Create {
      name,
      price,
      description,
      category,
      images,
    } => {
      let form = ProductForm {
        name,
        price,
        description,
        category,
        images,
      };
      let request = validation::validate_product_form(&form).map_err(CatalogError::from)?;
      let product = api.create_product(&request).await?;
      print!("{}", render::product_detail(&product));
    }
    ProductCommand::Update {
      id,
      name,
      price,
      description,
      category,
      images,
    } => {
      let patch = ProductPatch {
        name,
        price,
        description,
        category,
        images: (!images.is_empty()).then_some(images),
      };
      let request = validation::validate_product_patch(&patch).map_err(CatalogError::from)?;
      if request.is_empty() {
        return Err(eyre!("Nothing to update; pass at least one field"));
      }
      let product = api.update_product(&id, &request).await?;
      print!("{}", render::product_detail(&product));
    }
    ProductCommand::Delete { id } => {
      let response = api.delete_product(&id).await?;
      if response.message.is_empty() {
        println!("Deleted product {}", id);
      } else {
        println!("{}", response.message);
      }
    }
  }
  Ok(())
}

async fn categories(app: &App, cmd: CategoryCommand) -> Result<()> {
  let api = app.api();
  match cmd {
    CategoryCommand::List => {
      print_settled(&mut api.categories(), |c| render::category_table(c)).await?;
    }
    CategoryCommand::Show { id } => {
      print_settled(&mut api.category(&id), render::category_detail).await?;
    }
    CategoryCommand::Create { name, description } => {
      let form = CategoryForm { name, description };
      let request = validation::validate_category_form(&form).map_err(CatalogError::from)?;
      let category = api.create_category(&request).await?;
      print!("{}", render::category_detail(&category));
    }
    CategoryCommand::Update {
      id,
      name,
      description,
    } => {
      if name.is_none() && description.is_none() {
        return Err(eyre!("Nothing to update; pass --name or --description"));
      }
      let request = validation::validate_category_patch(name.as_deref(), description.as_deref())
        .map_err(CatalogError::from)?;
      let category = api.update_category(&id, &request).await?;
      print!("{}", render::category_detail(&category));
    }
    CategoryCommand::Delete { id } => {
      let response = api.delete_category(&id).await?;
      if response.message.is_empty() {
        println!("Deleted category {}", id);
      } else {
        println!("{}", response.message);
      }
    }
  }
  Ok(())
}

/// Wait for a query to settle and print it, failing on a rejected query.
async fn print_settled<T>(
  subscription: &mut Subscription<T>,
  format: impl Fn(&T) -> String,
) -> Result<()>
where
  T: serde::de::DeserializeOwned,
{
  let state = subscription.settled().await;
  if let Some(error) = state.error() {
    return Err(CatalogError::from(error.clone()).into());
  }
  print!("{}", render::query_state(state, format));
  Ok(())
}
