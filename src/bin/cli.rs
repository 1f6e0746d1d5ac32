use anyhow::{bail, Context};
use clap::{Arg, ArgMatches, Command};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wrapped_custody::{
    factory::{
        rpc::{event_json, parse_address, FactoryRpcHandler, QUERY_METHODS},
        Clock, EnumerableRoleRegistry, Factory, StandardFactory, SystemClock, WrappedToken,
    },
    storage::FactoryStore,
    CustodyConfig,
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let matches = Command::new("custody-cli")
        .version(wrapped_custody::VERSION)
        .about("Wrapped custody factory command line interface")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("JSON configuration file")
                .global(true),
        )
        .arg(
            Arg::new("data-dir")
                .short('d')
                .long("data-dir")
                .help("Data directory, overrides the configuration")
                .global(true),
        )
        .subcommand(
            Command::new("init")
                .about("Deploy the wrapped token and the factory")
                .arg(
                    Arg::new("owner")
                        .long("owner")
                        .help("Initial factory owner (admin and pauser)")
                        .required(true),
                )
                .arg(
                    Arg::new("token-owner")
                        .long("token-owner")
                        .help("Token administrator, defaults to the factory owner"),
                ),
        )
        .subcommand(
            Command::new("call")
                .about("Run a state-changing factory method")
                .arg(Arg::new("method").help("RPC method, e.g. factory_addMintRequest").required(true))
                .arg(Arg::new("from").long("from").help("Calling account").required(true))
                .arg(
                    Arg::new("params")
                        .long("params")
                        .help("JSON object with the method parameters")
                        .default_value("{}"),
                ),
        )
        .subcommand(
            Command::new("query")
                .about("Run a read-only factory method")
                .arg(Arg::new("method").help("RPC method, e.g. factory_getMintRequest").required(true))
                .arg(
                    Arg::new("params")
                        .long("params")
                        .help("JSON object with the method parameters")
                        .default_value("{}"),
                ),
        )
        .subcommand(
            Command::new("token")
                .about("Wrapped token operations")
                .subcommand(
                    Command::new("approve")
                        .about("Approve a spender, e.g. the factory before a burn")
                        .arg(Arg::new("from").long("from").required(true))
                        .arg(Arg::new("spender").long("spender").required(true))
                        .arg(Arg::new("amount").long("amount").required(true)),
                )
                .subcommand(
                    Command::new("transfer")
                        .about("Transfer wrapped tokens")
                        .arg(Arg::new("from").long("from").required(true))
                        .arg(Arg::new("to").long("to").required(true))
                        .arg(Arg::new("amount").long("amount").required(true)),
                )
                .subcommand(
                    Command::new("balance")
                        .about("Show an account balance")
                        .arg(Arg::new("account").long("account").required(true)),
                ),
        )
        .subcommand(
            Command::new("events")
                .about("Dump the event log")
                .arg(
                    Arg::new("since")
                        .long("since")
                        .help("First sequence number to show")
                        .default_value("0"),
                ),
        )
        .get_matches();

    let config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("init", init_matches)) => handle_init(&config, init_matches),
        Some(("call", call_matches)) => handle_call(&config, call_matches),
        Some(("query", query_matches)) => handle_query(&config, query_matches),
        Some(("token", token_matches)) => handle_token_commands(&config, token_matches),
        Some(("events", events_matches)) => handle_events(&config, events_matches),
        _ => {
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<CustodyConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => CustodyConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => CustodyConfig::default(),
    };

    if let Some(data_dir) = matches.get_one::<String>("data-dir") {
        config.data_dir = PathBuf::from(data_dir);
    }

    config.validate()?;
    Ok(config)
}

fn open_store(config: &CustodyConfig) -> anyhow::Result<FactoryStore> {
    let path = config.store_path();
    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create data directory {}", path.display()))?;
    Ok(FactoryStore::open(&path)?)
}

fn load_factory(store: &FactoryStore) -> anyhow::Result<StandardFactory> {
    match store.load_factory()? {
        Some(factory) => Ok(factory),
        None => bail!("No factory deployed yet, run `custody-cli init` first"),
    }
}

fn parse_params(matches: &ArgMatches) -> anyhow::Result<Value> {
    let raw = matches
        .get_one::<String>("params")
        .map(String::as_str)
        .unwrap_or("{}");
    let params: Value = serde_json::from_str(raw).context("Params must be a JSON object")?;
    if !params.is_object() {
        bail!("Params must be a JSON object");
    }
    Ok(params)
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> anyhow::Result<&'a String> {
    matches
        .get_one::<String>(name)
        .with_context(|| format!("Missing --{}", name))
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn handle_init(config: &CustodyConfig, matches: &ArgMatches) -> anyhow::Result<()> {
    let store = open_store(config)?;
    if store.load_factory()?.is_some() {
        bail!("A factory is already deployed in {}", config.store_path().display());
    }

    let owner = parse_address(&json!(required(matches, "owner")?)).map_err(anyhow::Error::msg)?;
    let token_owner = match matches.get_one::<String>("token-owner") {
        Some(address) => parse_address(&json!(address)).map_err(anyhow::Error::msg)?,
        None => owner,
    };

    let mut token = WrappedToken::new(
        config.token.name.clone(),
        config.token.symbol.clone(),
        config.token.decimals,
        config.token.address,
        token_owner,
    );
    token.grant_minter(token_owner, config.factory_address)?;

    let factory = Factory::new(
        config.factory_address,
        owner,
        EnumerableRoleRegistry::new(),
        token,
        SystemClock.now(),
    )?;
    store.commit(&factory)?;

    info!("Deployed factory {:?} with token {}", config.factory_address, config.token.symbol);
    print_json(&json!({
        "factory": format!("0x{:x}", config.factory_address),
        "token": format!("0x{:x}", config.token.address),
        "owner": format!("0x{:x}", owner),
    }))
}

/// Run one mutating RPC method and persist the result
fn run_and_commit(config: &CustodyConfig, method: &str, params: Value) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let mut factory = load_factory(&store)?;

    let response = FactoryRpcHandler::handle(&mut factory, SystemClock.now(), method, params)
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("{} failed", method))?;

    store.commit(&factory)?;
    print_json(&response)
}

fn handle_call(config: &CustodyConfig, matches: &ArgMatches) -> anyhow::Result<()> {
    let method = required(matches, "method")?;
    if QUERY_METHODS.contains(&method.as_str()) {
        bail!("{} is read-only, use `custody-cli query`", method);
    }

    let mut params = parse_params(matches)?;
    params["from"] = json!(required(matches, "from")?);

    run_and_commit(config, method, params)
}

fn handle_query(config: &CustodyConfig, matches: &ArgMatches) -> anyhow::Result<()> {
    let method = required(matches, "method")?;
    if !QUERY_METHODS.contains(&method.as_str()) {
        bail!("{} changes state, use `custody-cli call`", method);
    }

    let store = open_store(config)?;
    let mut factory = load_factory(&store)?;
    let params = parse_params(matches)?;

    let response = FactoryRpcHandler::handle(&mut factory, SystemClock.now(), method, params)
        .map_err(anyhow::Error::msg)?;
    print_json(&response)
}

fn handle_token_commands(config: &CustodyConfig, matches: &ArgMatches) -> anyhow::Result<()> {
    match matches.subcommand() {
        Some(("approve", approve_matches)) => {
            let params = json!({
                "from": required(approve_matches, "from")?,
                "spender": required(approve_matches, "spender")?,
                "amount": required(approve_matches, "amount")?,
            });
            run_and_commit(config, "token_approve", params)
        }
        Some(("transfer", transfer_matches)) => {
            let params = json!({
                "from": required(transfer_matches, "from")?,
                "to": required(transfer_matches, "to")?,
                "amount": required(transfer_matches, "amount")?,
            });
            run_and_commit(config, "token_transfer", params)
        }
        Some(("balance", balance_matches)) => {
            let store = open_store(config)?;
            let mut factory = load_factory(&store)?;
            let params = json!({ "account": required(balance_matches, "account")? });

            let response = FactoryRpcHandler::handle(&mut factory, SystemClock.now(), "token_balanceOf", params)
                .map_err(anyhow::Error::msg)?;
            print_json(&response)
        }
        _ => {
            println!("Use `custody-cli token --help` for available commands");
            Ok(())
        }
    }
}

fn handle_events(config: &CustodyConfig, matches: &ArgMatches) -> anyhow::Result<()> {
    let since: u64 = required(matches, "since")?
        .parse()
        .context("--since must be a sequence number")?;

    let store = open_store(config)?;
    for record in store.events_since(since)? {
        let mut line = event_json(&record.event);
        line["sequence"] = json!(record.sequence);
        line["timestamp"] = json!(record.timestamp);
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(())
}
