use crate::config::Config;
use crate::interpreter::{
    Completion, ControlOutcome, DataStore, Host, Interpreter, Script, Value, WaitKind, WaitRequest,
};
use crate::scene::Scene;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "molscript")]
#[command(about = "Molscript - run compiled molecular scene scripts", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a compiled script
    Run {
        /// Compiled script (JSON)
        script: PathBuf,

        /// Scene to run against (JSON); defaults to an empty scene
        #[arg(long)]
        scene: Option<PathBuf>,

        /// Suspend on waits and complete them on the async runtime
        #[arg(long)]
        cooperative: bool,
    },

    /// Validate a compiled script without running it
    Check {
        /// Compiled script (JSON)
        script: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    let config = Config::builder()
        .config_path(cli.config.map(PathBuf::from))
        .build()?;
    init_tracing(&config.logging.level);

    match cli.command {
        Commands::Run {
            script,
            scene,
            cooperative,
        } => {
            let script = read_script(&script)?;
            let scene = match scene {
                Some(path) => {
                    let json = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read scene {}", path.display()))?;
                    Scene::from_json(&json)
                        .with_context(|| format!("Invalid scene {}", path.display()))?
                }
                None => Scene::new(),
            };
            let mut interpreter_config = config.interpreter.clone();
            if cooperative {
                interpreter_config.host_can_block = false;
            }
            let host = CliHost::new(scene, !cooperative);
            let mut interp = Interpreter::new(host, interpreter_config);

            let outcome = drive(&mut interp, script).await;
            report(outcome)?;
        }

        Commands::Check { script } => {
            let script = read_script(&script)?;
            let mut interp = Interpreter::new(CliHost::new(Scene::new(), true), config.interpreter);
            interp
                .check(&script)
                .map_err(|e| anyhow::anyhow!("{}", e.report()))?;
            println!("✓ {} ({} statements) is valid", script.name, script.len());
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn read_script(path: &Path) -> Result<Rc<Script>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    let script: Script = serde_json::from_str(&json)
        .with_context(|| format!("Invalid script {}", path.display()))?;
    Ok(Rc::new(script))
}

/// Run to completion, answering suspensions on the async runtime
async fn drive(interp: &mut Interpreter<CliHost>, script: Rc<Script>) -> ControlOutcome {
    let mut outcome = interp.run(script);
    while let ControlOutcome::Suspend(suspension) = outcome {
        let completion = complete_async(interp.host_mut(), &suspension.request).await;
        outcome = interp.resume(suspension, completion);
    }
    outcome
}

fn report(outcome: ControlOutcome) -> Result<()> {
    match outcome {
        ControlOutcome::Done(value) => {
            info!(result = %value, "Script finished");
            Ok(())
        }
        ControlOutcome::Error(error) => Err(anyhow::anyhow!("{}", error.report())),
        ControlOutcome::Halt => Err(anyhow::anyhow!("script halted")),
        ControlOutcome::Continue | ControlOutcome::Suspend(_) => {
            Err(anyhow::anyhow!("script stopped without finishing"))
        }
    }
}

/* ===================== Host ===================== */

/// Host for the command line: prints to stdout, loads scenes from disk
pub struct CliHost {
    scene: Scene,
    blocking: bool,
}

impl CliHost {
    pub fn new(scene: Scene, blocking: bool) -> Self {
        Self { scene, blocking }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// A loaded scene file replaces the scene; any other file is read as text
    fn finish_load(&mut self, path: &str, contents: std::io::Result<String>) -> Completion {
        let text = match contents {
            Ok(text) => text,
            Err(e) => return Completion::Failed(format!("cannot load {}: {}", path, e)),
        };
        match Scene::from_json(&text) {
            Ok(scene) => {
                debug!(path, atoms = scene.atoms.len(), "Scene loaded");
                self.scene = scene;
                Completion::Done(Value::Int(self.scene.atoms.len() as i32))
            }
            Err(_) => Completion::Done(Value::Str(text)),
        }
    }
}

impl Host for CliHost {
    fn store(&self) -> &dyn DataStore {
        &self.scene
    }

    fn store_mut(&mut self) -> &mut dyn DataStore {
        &mut self.scene
    }

    fn output(&mut self, text: &str) {
        println!("{}", text);
    }

    fn can_block(&self) -> bool {
        self.blocking
    }

    fn wait(&mut self, request: &WaitRequest) -> Completion {
        match &request.kind {
            WaitKind::Delay { seconds } => match delay_duration(*seconds) {
                Ok(duration) => {
                    std::thread::sleep(duration);
                    Completion::Done(Value::empty_string())
                }
                Err(message) => Completion::Failed(message),
            },
            WaitKind::Pause { message } => {
                eprintln!("paused: {}", message);
                Completion::Done(Value::empty_string())
            }
            WaitKind::Load { path } => {
                let contents = std::fs::read_to_string(path);
                self.finish_load(path, contents)
            }
        }
    }
}

/// Negative delays do not wait; NaN and unrepresentable delays fail
fn delay_duration(seconds: f64) -> Result<Duration, String> {
    if seconds.is_nan() {
        return Err("invalid delay: NaN seconds".to_string());
    }
    Duration::try_from_secs_f64(seconds.max(0.0))
        .map_err(|e| format!("invalid delay of {} seconds: {}", seconds, e))
}

async fn complete_async(host: &mut CliHost, request: &WaitRequest) -> Completion {
    match &request.kind {
        WaitKind::Delay { seconds } => match delay_duration(*seconds) {
            Ok(duration) => {
                tokio::time::sleep(duration).await;
                Completion::Done(Value::empty_string())
            }
            Err(message) => Completion::Failed(message),
        },
        WaitKind::Pause { message } => {
            eprintln!("paused: {}", message);
            Completion::Done(Value::empty_string())
        }
        WaitKind::Load { path } => {
            let contents = tokio::fs::read_to_string(path).await;
            host.finish_load(path, contents)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::{Flow, Op, Statement, Token, Verb};

    fn delay_script() -> Rc<Script> {
        let statements = vec![
            Statement::new(vec![Token::command(Verb::Delay), Token::literal(0.01)]),
            Statement::new(vec![Token::command(Verb::Print), Token::literal("after")]),
            Statement::new(vec![Token::flow(Flow::Return, 0), Token::literal(5)]),
        ];
        Rc::new(Script::new("delay", statements))
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::parse_from(["molscript", "run", "a.json", "--cooperative"]);
        match cli.command {
            Commands::Run {
                script,
                scene,
                cooperative,
            } => {
                assert_eq!(script, PathBuf::from("a.json"));
                assert!(scene.is_none());
                assert!(cooperative);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_cooperative_drive_resumes() {
        let mut config = crate::config::InterpreterConfig::default();
        config.host_can_block = false;
        let mut interp = Interpreter::new(CliHost::new(Scene::new(), false), config);

        let outcome = tokio_test::block_on(drive(&mut interp, delay_script()));
        assert_eq!(outcome.into_done(), Some(Value::Int(5)));
    }

    #[test]
    fn test_unrepresentable_delay_fails() {
        let mut host = CliHost::new(Scene::new(), true);
        for seconds in [f64::INFINITY, f64::NAN, 1e300] {
            let request = WaitRequest::new(WaitKind::Delay { seconds });
            assert!(matches!(host.wait(&request), Completion::Failed(_)), "{}", seconds);
        }
        let request = WaitRequest::new(WaitKind::Delay { seconds: -1.0 });
        assert!(matches!(host.wait(&request), Completion::Done(_)));
    }

    #[test]
    fn test_infinite_delay_is_a_catchable_error() {
        let mut config = crate::config::InterpreterConfig::default();
        config.host_can_block = false;
        let mut interp = Interpreter::new(CliHost::new(Scene::new(), false), config);
        let statements = vec![
            Statement::new(vec![
                Token::command(Verb::Delay),
                Token::literal(1),
                Token::op(Op::Divide),
                Token::literal(0),
            ]),
            Statement::new(vec![Token::flow(Flow::Return, 0), Token::literal(5)]),
        ];
        let script = Rc::new(Script::new("forever", statements));

        let outcome = tokio_test::block_on(drive(&mut interp, script));
        let ControlOutcome::Error(err) = outcome else {
            panic!("expected an error, got {:?}", outcome);
        };
        assert_eq!(err.code, crate::interpreter::errors::IO_ERROR);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let mut host = CliHost::new(Scene::new(), true);
        let request = WaitRequest::new(WaitKind::Load {
            path: "/nonexistent/scene.json".into(),
        });
        assert!(matches!(host.wait(&request), Completion::Failed(_)));
    }
}
