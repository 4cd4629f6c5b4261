//! Builds two session factories over one in-process database and queries
//! parents with a fetch graph from each of them.
//!
//! The graph built from the querying session's own factory loads the
//! children with the parents. The graph built from the other factory is
//! ignored, so the children stay deferred until first accessed.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use lazyrel_orm::{
    parent_child_mapping, Child, Criteria, FactoryConfig, MismatchPolicy, Parent, Session,
    SessionFactory,
};
use lazyrel_store::{ConnectionConfig, SchemaAction, StoreConfig, StoreServer};

/// Which fetch graph to hand to the query.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Scenario {
    /// Graph from the querying session's factory
    Same,
    /// Graph from the second factory
    Foreign,
    Both,
}

/// Command-line arguments for the probe.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, value_enum, default_value_t = Scenario::Both)]
    scenario: Scenario,

    /// Echo every statement
    #[arg(long)]
    show_sql: bool,

    /// One clause per line when echoing
    #[arg(long)]
    format_sql: bool,

    /// Reject graphs of another mapping instance instead of ignoring them
    #[arg(long)]
    strict: bool,

    /// Name given to both children
    #[arg(long, default_value = "child1")]
    child_name: String,
}

const DATABASE: &str = "example";
const USER: &str = "user";
const PASSWORD: &str = "1";

/// What one query observed.
struct Outcome {
    parents: usize,
    children_loaded_with_query: bool,
    children: usize,
    query_statements: u64,
    access_statements: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt::init();

    let server = Arc::new(StoreServer::new("localhost", 5432, StoreConfig::default()));
    server.create_database(DATABASE, USER, PASSWORD)?;

    let config = |action| {
        let policy = if args.strict {
            MismatchPolicy::Reject
        } else {
            MismatchPolicy::Ignore
        };
        FactoryConfig::new(
            ConnectionConfig::new(server.url(DATABASE), USER, PASSWORD),
            action,
        )
        .show_sql(args.show_sql)
        .format_sql(args.format_sql)
        .mismatch_policy(policy)
    };
    let factory1 = SessionFactory::build(
        Arc::clone(&server),
        parent_child_mapping()?,
        config(SchemaAction::Create),
    )
    .context("building the first factory")?;
    let factory2 = SessionFactory::build(
        Arc::clone(&server),
        parent_child_mapping()?,
        config(SchemaAction::Validate),
    )
    .context("building the second factory")?;
    tracing::info!(first = %factory1.mapping().id(), second = %factory2.mapping().id(), "factories built");

    let session = factory1.open_session()?;
    create_data(&session, &args.child_name)?;

    if matches!(args.scenario, Scenario::Same | Scenario::Both) {
        report("same factory", run(&session, &factory1, &args.child_name));
        session.clear()?;
    }
    if matches!(args.scenario, Scenario::Foreign | Scenario::Both) {
        report("other factory", run(&session, &factory2, &args.child_name));
    }

    println!("{}", serde_json::to_string_pretty(&session.statistics()?)?);
    session.close()?;
    tracing::info!(open_connections = server.open_connections(), "done");
    Ok(())
}

/// Inserts one parent with two children sharing `child_name`.
fn create_data(session: &Session, child_name: &str) -> anyhow::Result<()> {
    session.begin_transaction()?;
    let parent = Parent::new_ref("parent");
    for _ in 0..2 {
        Parent::add_child(&parent, &Child::new_ref(child_name))?;
    }
    session.persist(&parent)?;
    session.commit()?;
    session.clear()?;
    Ok(())
}

/// Queries parents having a child named `child_name`, with a children
/// graph built from `graph_source`, then touches the children.
fn run(session: &Session, graph_source: &SessionFactory, child_name: &str) -> anyhow::Result<Outcome> {
    let mut graph = graph_source.create_fetch_graph::<Parent>()?;
    graph.add_subgraph(Parent::CHILDREN)?;
    let criteria = Criteria::<Parent>::new().where_association_eq(Parent::CHILDREN, "name", child_name);

    let before = session.statistics()?.statements;
    let parents = session.query(&criteria, Some(&graph))?;
    let after_query = session.statistics()?.statements;

    let parent = parents.first().context("no parent matched")?;
    let mut parent = parent.borrow_mut();
    let children_loaded_with_query = parent.is_children_materialized();
    let children = parent.children()?.len();
    let after_access = session.statistics()?.statements;

    Ok(Outcome {
        parents: parents.len(),
        children_loaded_with_query,
        children,
        query_statements: after_query - before,
        access_statements: after_access - after_query,
    })
}

fn report(label: &str, outcome: anyhow::Result<Outcome>) {
    match outcome {
        Ok(o) => println!(
            "{label}: {} parent(s), children {} with the query, {} child(ren); statements: query {}, access {}",
            o.parents,
            if o.children_loaded_with_query { "loaded" } else { "deferred" },
            o.children,
            o.query_statements,
            o.access_statements,
        ),
        Err(e) => println!("{label}: failed: {e:#}"),
    }
}
