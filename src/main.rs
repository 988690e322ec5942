use anyhow::{Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::path::PathBuf;
use tracing::info;

use hackatari::{
    AtariEnv, EnvConfig, Frontend, HackAtari, HumanPlayable, InputEvent, ModifSet, PongSim,
    RenderMode, WindowFrontend,
};

const GAME: &str = "Pong";

// =============================================================================
// CLI
// =============================================================================

#[derive(Parser)]
#[command(name = "hackatari", about = "Pong with RAM-level game modifications")]
struct Cli {
    /// `human` plays with the keyboard; anything else runs a random agent.
    mode: Option<String>,
    /// JSON file with environment settings
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
    /// Modifications to apply, comma separated
    #[arg(long, value_delimiter = ',', default_value = "lazy_enemy")]
    modifs: Vec<String>,
    /// No window for the random agent
    #[arg(long, default_value_t = false)]
    headless: bool,
    /// Fail on unknown modification names instead of skipping them
    #[arg(long, default_value_t = false)]
    strict: bool,
}

impl Cli {
    fn env_config(&self) -> Result<EnvConfig> {
        let mut config = match &self.config {
            Some(path) => EnvConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => EnvConfig::default(),
        };
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        Ok(config)
    }

    fn modif_set(&self) -> Result<ModifSet> {
        if self.strict {
            ModifSet::try_from_names(&self.modifs).context("building modifications")
        } else {
            Ok(ModifSet::from_names(&self.modifs))
        }
    }
}

// =============================================================================
// Human Play
// =============================================================================

fn human(cli: &Cli) -> Result<()> {
    eprintln!("=== Human Play ===");
    eprintln!("Controls: D=up  A=down  Space=fire  P=pause  R=reset  Esc=quit");

    let config = cli.env_config()?;
    let frontend = WindowFrontend::new("HackAtari - Pong");
    let mut play: HumanPlayable<PongSim, WindowFrontend> =
        HumanPlayable::with_modifs(GAME, cli.modif_set()?, config, frontend)?;
    play.run().context("interactive loop")?;
    Ok(())
}

// =============================================================================
// Random Agent
// =============================================================================

/// The agent's sampler. Seeded one past the env seed so the two streams differ.
fn agent_rng(env_seed: Option<u64>) -> SmallRng {
    match env_seed {
        Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(1)),
        None => SmallRng::from_os_rng(),
    }
}

fn random_agent(cli: &Cli) -> Result<()> {
    eprintln!(
        "\n\nRandom agent playing, modify the script to integrate your agent or play as a \
         human by using `human` as an script argument.\n\n"
    );

    let mut config = cli.env_config()?;
    if !cli.headless {
        config.render_mode = RenderMode::Human;
    }
    let mut rng = agent_rng(config.seed);
    let env = PongSim::make(GAME, config)?;
    let mut env = HackAtari::with_modifs(GAME, cli.modif_set()?, env)?;
    let mut frontend = WindowFrontend::new("HackAtari - Pong");

    env.reset(None)?;
    if let Some(frame) = env.render() {
        frontend.present(frame)?;
    }

    let space = env.action_space();
    let mut total_reward = 0.0f64;
    let mut steps = 0u64;
    loop {
        if frontend.poll_events()?.contains(&InputEvent::Quit) {
            info!("window closed");
            break;
        }
        let ret = env.step(space.sample(&mut rng))?;
        total_reward += ret.reward as f64;
        steps += 1;
        if let Some(frame) = env.render() {
            frontend.present(frame)?;
        }
        if ret.done() {
            break;
        }
    }

    let (player, enemy) = env.env().scores();
    info!(steps, total_reward, player, enemy, "episode finished");
    eprintln!("Random agent: reward={total_reward:.1}, steps={steps}, score={player}-{enemy}");
    env.close();
    frontend.close();
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()))
        .init();

    let cli = Cli::parse();

    match cli.mode.as_deref() {
        Some("human") => human(&cli),
        _ => random_agent(&cli),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn agent_stream_differs_from_env_stream() {
        let draws = |rng: &mut SmallRng| (0..8).map(|_| rng.random::<u64>()).collect::<Vec<_>>();
        let agent = draws(&mut agent_rng(Some(7)));
        assert_ne!(agent, draws(&mut SmallRng::seed_from_u64(7)));
        assert_eq!(agent, draws(&mut agent_rng(Some(7))));
        assert_eq!(
            draws(&mut agent_rng(Some(u64::MAX))),
            draws(&mut SmallRng::seed_from_u64(0))
        );
    }

    #[test]
    fn strict_flag_rejects_unknown_modifs() {
        let cli = Cli::parse_from(["hackatari", "--strict", "--modifs", "lazy_enemy,gravity"]);
        assert!(cli.modif_set().is_err());
        let cli = Cli::parse_from(["hackatari", "--modifs", "lazy_enemy,gravity"]);
        assert_eq!(cli.modif_set().unwrap().len(), 1);
        let cli = Cli::parse_from(["hackatari", "human", "--seed", "3"]);
        assert_eq!(cli.mode.as_deref(), Some("human"));
        assert_eq!(cli.env_config().unwrap().seed, Some(3));
    }
}
