mod logger;

use std::{env, error::Error, process, sync::Arc};

use relgraph_config::load_config;
use relgraph_executor::{
    pipeline::{GraphQLRequest, QueryEngine},
    store::{memory::InMemoryStore, BackingStore, MutationStore},
};
use relgraph_query_planner::{ast::lowering::Variables, schema::social::social_schema};
use tracing::info;

use crate::logger::configure_logging;

const USAGE: &str = "Usage:
  relgraph-dev-cli plan <operation_path> [--json]
  relgraph-dev-cli execute <fixture_path> <operation_path> [variables_path]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config_path = env::var("RELGRAPH_CONFIG_FILE_PATH").ok();
    let config = load_config(config_path)?;
    configure_logging(&config.log);

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("{USAGE}");
        process::exit(1);
    }

    let registry = Arc::new(social_schema()?);

    match args[1].as_str() {
        "plan" => {
            let operation = std::fs::read_to_string(&args[2])?;
            let store = InMemoryStore::new(registry.clone());
            let engine = QueryEngine::new(registry, BackingStore::to_boxed_arc(store), config)?;
            let prepared = engine.prepare(&GraphQLRequest::new(operation))?;

            if args.iter().any(|arg| arg == "--json") {
                println!("{}", serde_json::to_string_pretty(&prepared.plan)?);
            } else {
                println!("{}", prepared.plan);
            }
        }
        "execute" => {
            if args.len() < 4 {
                eprintln!("{USAGE}");
                process::exit(1);
            }

            let fixture: serde_json::Value =
                serde_json::from_str(&std::fs::read_to_string(&args[2])?)?;
            let store = InMemoryStore::from_fixture(registry.clone(), &fixture)?;
            info!(types = registry.types().count(), "fixture loaded from {}", args[2]);

            let mut request = GraphQLRequest::new(std::fs::read_to_string(&args[3])?);
            if let Some(variables_path) = args.get(4) {
                let variables: Variables =
                    serde_json::from_str(&std::fs::read_to_string(variables_path)?)?;
                request = request.with_variables(variables);
            }

            let engine = QueryEngine::new(
                registry,
                BackingStore::to_boxed_arc(store.clone()),
                config,
            )?
            .with_mutations(MutationStore::to_boxed_arc(store.clone()));

            let response = engine.execute(&request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            info!(fetches = store.fetch_count(), "request finished");
        }
        _ => {
            eprintln!("Unknown command. Available commands: plan, execute");
            eprintln!("{USAGE}");
            process::exit(1);
        }
    }

    Ok(())
}
