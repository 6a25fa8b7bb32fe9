//! Operator CLI for the sales data-access layer.
//!
//! Usage:
//!   sales_cli ping
//!   sales_cli --db sales.db user-add --name .. --email .. --role ADMIN --password ..
//!   sales_cli --db sales.db users --order-by name,DESC
//!   sales_cli --db sales.db summary

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use log::info;
use sales_core::model::user::{EVENT_CREATED, EVENT_SOURCE, ORDER_BY_ID};
use sales_core::model::user_summary::ORDER_BY_USER_ID;
use sales_core::{
    execute_in_transaction, init_logging, open_db, open_db_in_memory, Argon2Hasher,
    CachedUserStore, Connection, CoreConfig, CoreError, Direction, DomainEvent, Email, EventCore,
    EventSink, NewUser, OrderBy, Page, RequestContext, Role, SqliteUserStore,
    SqliteUserSummaryStore, SystemClock, UserCache, UserCore, UserFilter, UserSummaryCore,
    UserSummaryFilter,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "sales_cli")]
#[command(about = "Sales data-access operator tool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON config file; SALES_* environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file (overrides config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the core library is linked
    Ping,
    /// Create a user inside a transaction
    UserAdd(UserAddArgs),
    /// List users
    Users(ListArgs),
    /// List per-user product summaries
    Summary(ListArgs),
}

#[derive(Args)]
struct UserAddArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    /// Repeatable; ADMIN or USER
    #[arg(long = "role", required = true)]
    roles: Vec<String>,
    #[arg(long)]
    department: Option<String>,
    #[arg(long)]
    password: String,
}

#[derive(Args)]
struct ListArgs {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 10)]
    rows: u32,
    /// `field[,ASC|DESC]`
    #[arg(long)]
    order_by: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = CoreConfig::load(cli.config.as_deref()).context("load config")?;
    if let Some(db) = cli.db {
        config.db_path = Some(db);
    }
    init_logging(&config.logging()).context("init logging")?;

    match cli.command {
        Commands::Ping => {
            println!("sales_core ping={}", sales_core::ping());
            println!("sales_core version={}", sales_core::core_version());
            Ok(())
        }
        Commands::UserAdd(args) => user_add(&config, args),
        Commands::Users(args) => list_users(&config, args),
        Commands::Summary(args) => list_summaries(&config, args),
    }
}

fn open(config: &CoreConfig) -> anyhow::Result<Connection> {
    let conn = match &config.db_path {
        Some(path) => open_db(path).with_context(|| format!("open {}", path.display()))?,
        None => open_db_in_memory().context("open in-memory database")?,
    };
    Ok(conn)
}

fn user_add(config: &CoreConfig, args: UserAddArgs) -> anyhow::Result<()> {
    let roles = args
        .roles
        .iter()
        .map(|role| role.parse::<Role>())
        .collect::<Result<Vec<_>, _>>()?;
    let new_user = NewUser {
        name: args.name,
        email: Email::parse(&args.email)?,
        roles,
        department: args.department,
        password: args.password.clone(),
        password_confirm: args.password,
    };

    let conn = open(config)?;
    let events = Arc::new(EventCore::new());
    events.add_handler(EVENT_SOURCE, EVENT_CREATED, |event: &DomainEvent| {
        info!(
            "event=user_created_notified module=cli status=ok params={}",
            String::from_utf8_lossy(&event.raw_params)
        );
        Ok(())
    });

    let cache = Arc::new(UserCache::new(config.cache_ttl(), Arc::new(SystemClock)));
    let core = UserCore::new(
        CachedUserStore::new(SqliteUserStore::new(&conn), cache),
        Arc::new(SystemClock),
        Arc::new(Argon2Hasher::default()),
    )
    .with_event_sink(events as Arc<dyn EventSink>)
    .with_projection(config.update_event_projection);

    let ctx = RequestContext::background();
    let (user, pending) = execute_in_transaction(&conn, |tx| {
        let tx_core = core.rebind_to_transaction(tx)?;
        let user = tx_core.create(&ctx, new_user)?;
        Ok::<_, CoreError>((user, tx_core.take_pending_commit()))
    })?;
    core.publish_committed(pending);

    println!("{}\t{}\t{}", user.user_id, user.email, user.name);
    Ok(())
}

fn list_users(config: &CoreConfig, args: ListArgs) -> anyhow::Result<()> {
    let conn = open(config)?;
    let core = UserCore::new(
        SqliteUserStore::new(&conn),
        Arc::new(SystemClock),
        Arc::new(Argon2Hasher::default()),
    );
    let order_by = parse_order(args.order_by.as_deref(), ORDER_BY_ID)?;
    let page = Page::new(args.page, args.rows)?;

    let ctx = RequestContext::background();
    let filter = UserFilter::default();
    let users = core.query(&ctx, &filter, &order_by, page)?;
    let total = core.count(&ctx, &filter)?;

    for user in &users {
        let roles: Vec<&str> = user.roles.iter().map(|role| role.name()).collect();
        println!(
            "{}\t{}\t{}\t{}\tenabled={}",
            user.user_id,
            user.email,
            user.name,
            roles.join(","),
            user.enabled
        );
    }
    println!("total={total}");
    Ok(())
}

fn list_summaries(config: &CoreConfig, args: ListArgs) -> anyhow::Result<()> {
    let conn = open(config)?;
    let core = UserSummaryCore::new(SqliteUserSummaryStore::new(&conn));
    let order_by = parse_order(args.order_by.as_deref(), ORDER_BY_USER_ID)?;
    let page = Page::new(args.page, args.rows)?;

    let ctx = RequestContext::background();
    let filter = UserSummaryFilter::default();
    for summary in core.query(&ctx, &filter, &order_by, page)? {
        println!(
            "{}\t{}\tproducts={}\tcost={:.2}",
            summary.user_id, summary.user_name, summary.total_count, summary.total_cost
        );
    }
    println!("total={}", core.count(&ctx, &filter)?);
    Ok(())
}

fn parse_order(value: Option<&str>, default_field: &str) -> anyhow::Result<OrderBy> {
    let default = OrderBy::new(default_field, Direction::Asc);
    match value {
        None => Ok(default),
        Some(value) if value.trim().is_empty() => bail!("--order-by must not be empty"),
        Some(value) => Ok(OrderBy::parse(value, &default)?),
    }
}
