//! quickpromise CLI
//!
//! Runs built-in promise scenarios against a fresh event loop and prints how
//! each scenario's result promise settled.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use quickpromise::prelude::*;
use quickpromise::VERSION;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "quickpromise")]
#[command(author, version, about = "Run promise core scenarios", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Event loop configuration file (JSON)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Override the microtask budget
    #[arg(long, value_name = "N", global = true)]
    budget: Option<usize>,

    /// Print event loop statistics as JSON after each scenario
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available scenarios
    List,

    /// Run scenarios (all of them if none are named)
    Run {
        /// Scenario names
        names: Vec<String>,
    },
}

struct Scenario {
    name: &'static str,
    build: fn(&Constructor) -> Promise,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => EventLoopConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => EventLoopConfig::default(),
    };
    if let Some(budget) = cli.budget {
        config = config.with_microtask_budget(budget);
    }

    match cli.command.unwrap_or(Commands::Run { names: Vec::new() }) {
        Commands::List => {
            for scenario in scenarios() {
                println!("{}", scenario.name);
            }
        }
        Commands::Run { names } => {
            let selected = select(&names)?;
            tracing::info!(version = VERSION, count = selected.len(), "running scenarios");
            for scenario in selected {
                run_scenario(&scenario, &config, cli.json)?;
            }
        }
    }
    Ok(())
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn select(names: &[String]) -> anyhow::Result<Vec<Scenario>> {
    let all = scenarios();
    if names.is_empty() {
        return Ok(all);
    }
    let known: Vec<&str> = all.iter().map(|s| s.name).collect();
    for name in names {
        if !known.contains(&name.as_str()) {
            bail!("unknown scenario '{}' (try `quickpromise list`)", name);
        }
    }
    Ok(all
        .into_iter()
        .filter(|s| names.iter().any(|n| n == s.name))
        .collect())
}

fn run_scenario(scenario: &Scenario, config: &EventLoopConfig, json: bool) -> anyhow::Result<()> {
    let event_loop = Rc::new(EventLoop::with_config(config.clone()));
    let ctor = Constructor::new(event_loop.clone());

    let observed = (scenario.build)(&ctor);
    let run = event_loop.run_until_idle();

    let outcome = match (observed.state(), observed.result()) {
        (PromiseState::Pending, _) => "pending".to_string(),
        (PromiseState::Fulfilled, Some(value)) => format!("fulfilled {:?}", value),
        (PromiseState::Rejected, Some(reason)) => format!("rejected {:?}", reason),
        (state, None) => format!("{:?}", state),
    };
    println!("{}: {}", scenario.name, outcome);
    if run.budget_exhausted {
        println!("{}: stopped after {} microtasks", scenario.name, run.microtasks_processed);
    }

    if json {
        println!("{}", serde_json::to_string(&event_loop.stats())?);
    }
    Ok(())
}

fn identity() -> Function {
    Function::new("identity", |args| Ok(first_arg(args)))
}

fn nested(ctor: &Constructor, value: Value) -> Promise {
    let p1 = ctor.resolved(value);
    let p2 = ctor.resolved(Value::Promise(p1));
    ctor.resolved(Value::Promise(p2))
}

/// Records "n" on construction, "x<v>"/"r<v>" when capabilities fire, "d" on
/// `deferred` and "w" on `chain`
struct TracingSpecies {
    log: Rc<RefCell<String>>,
}

impl TracingSpecies {
    fn logged(log: &Rc<RefCell<String>>, prefix: &'static str, capability: Value) -> Value {
        let log = log.clone();
        Value::Function(Function::new(prefix, move |args| {
            let value = first_arg(args);
            log.borrow_mut().push_str(&format!("{}{}", prefix, value));
            match &capability {
                Value::Function(capability) => capability.call(&[value]),
                _ => Ok(Value::Undefined),
            }
        }))
    }
}

impl Species for TracingSpecies {
    fn name(&self) -> &str {
        "TracingPromise"
    }

    fn construct(&self, constructor: &Constructor, executor: Function) -> Promise {
        self.log.borrow_mut().push('n');
        let log = self.log.clone();
        constructor.construct_base(Function::new("tracing executor", move |args| {
            let resolve = Self::logged(&log, "x", first_arg(args));
            let reject = Self::logged(&log, "r", args.get(1).cloned().unwrap_or_default());
            executor.call(&[resolve, reject])
        }))
    }

    fn deferred(&self, constructor: &Constructor) -> Deferred {
        self.log.borrow_mut().push('d');
        constructor.deferred_base()
    }

    fn chain(&self, promise: &Promise, on_fulfilled: Option<Handler>, on_rejected: Option<Handler>) -> Promise {
        self.log.borrow_mut().push('w');
        promise.chain_base(on_fulfilled, on_rejected)
    }
}

fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "resolved/chain",
            build: |ctor| nested(ctor, Value::from(5)).chain(Some(identity()), None),
        },
        Scenario {
            name: "resolved/then",
            build: |ctor| nested(ctor, Value::from(5)).then(Some(identity()), None),
        },
        Scenario {
            name: "resolved/thenable/then",
            build: |ctor| {
                let p1 = ctor.resolved(Value::from(5));
                let thenable = Object::thenable(Function::new("then", move |args| {
                    match args.first() {
                        Some(Value::Function(on_resolve)) => {
                            on_resolve.call(&[Value::Promise(p1.clone())])
                        }
                        _ => Ok(Value::Undefined),
                    }
                }));
                ctor.resolved(Value::Object(thenable))
                    .then(Some(identity()), None)
            },
        },
        Scenario {
            name: "then/reject",
            build: |ctor| {
                let deferred = ctor.deferred();
                let p2 = ctor.resolved(Value::Promise(deferred.promise().clone()));
                let p3 = ctor.resolved(Value::Promise(p2));
                let observed = p3.then(None, Some(identity()));
                deferred.reject(Value::from(5));
                observed
            },
        },
        Scenario {
            name: "cyclic/then",
            build: |ctor| {
                let slot: Rc<RefCell<Option<Promise>>> = Rc::new(RefCell::new(None));
                let own = slot.clone();
                let p2 = ctor.resolved(Value::from(0)).then(
                    Some(Function::new("return self", move |_| {
                        Ok(own.borrow().clone().map(Value::Promise).unwrap_or_default())
                    })),
                    None,
                );
                *slot.borrow_mut() = Some(p2.clone());
                p2
            },
        },
        Scenario {
            name: "cyclic/deferred/then",
            build: |ctor| {
                let deferred = ctor.deferred();
                deferred.resolve(Value::Promise(deferred.promise().clone()));
                deferred.promise().then(None, None)
            },
        },
        Scenario {
            name: "all/resolve",
            build: |ctor| {
                let deferreds: Vec<Deferred> = (0..3).map(|_| ctor.deferred()).collect();
                let items = deferreds
                    .iter()
                    .map(|d| Value::Promise(d.promise().clone()))
                    .collect();
                let observed = ctor.all(items);
                deferreds[0].resolve(Value::from(1));
                deferreds[2].resolve(Value::from(3));
                deferreds[1].resolve(Value::from(2));
                observed
            },
        },
        Scenario {
            name: "all/reject",
            build: |ctor| {
                let deferreds: Vec<Deferred> = (0..3).map(|_| ctor.deferred()).collect();
                let items = deferreds
                    .iter()
                    .map(|d| Value::Promise(d.promise().clone()))
                    .collect();
                let observed = ctor.all(items);
                deferreds[0].resolve(Value::from(1));
                deferreds[2].resolve(Value::from(3));
                deferreds[1].reject(Value::from(2));
                observed
            },
        },
        Scenario {
            name: "one/resolve",
            build: |ctor| {
                let deferreds: Vec<Deferred> = (0..3).map(|_| ctor.deferred()).collect();
                let items = deferreds
                    .iter()
                    .map(|d| Value::Promise(d.promise().clone()))
                    .collect();
                let observed = ctor.one(items);
                deferreds[2].resolve(Value::from(3));
                deferreds[0].resolve(Value::from(1));
                observed
            },
        },
        Scenario {
            name: "one/const",
            build: |ctor| {
                let items = (1..=3)
                    .map(|n| Value::Promise(ctor.resolved(Value::from(n))))
                    .collect::<Vec<_>>();
                let mut with_const = vec![Value::from(0)];
                with_const.extend(items);
                ctor.one(with_const)
            },
        },
        Scenario {
            name: "species/all",
            build: |ctor| {
                let log = Rc::new(RefCell::new(String::new()));
                let traced = Constructor::with_species(
                    ctor.scheduler().clone(),
                    TracingSpecies { log: log.clone() },
                );
                let items = vec![
                    Value::from(21),
                    Value::Promise(ctor.resolved(Value::from(22))),
                    Value::Promise(traced.resolved(Value::from(24))),
                    Value::from(25),
                ];
                traced.all(items);
                let trace = log.borrow().clone();
                ctor.resolved(Value::from(trace))
            },
        },
    ]
}
