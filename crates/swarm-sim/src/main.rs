//! Swarm Simulator CLI
//!
//! Runs a scripted takeoff, hover, move and land over a simulated fleet
//! and prints where every agent ended up.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use swarm_domain::{AgentRecord, GroupMask, Vec3};
use swarm_sim::{CollisionParams, SimConfig, SimulationClock, Swarm, config};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "swarm-sim")]
#[command(about = "Simulate an aerial swarm flying a scripted scenario")]
struct Args {
    /// JSON fleet file: a list of {"id", "initialPosition"} records
    #[arg(short, long)]
    fleet: Option<PathBuf>,

    /// Number of agents placed on a line when no fleet file is given
    #[arg(short, long, default_value = "4")]
    agents: u32,

    /// Tick length in seconds
    #[arg(long)]
    dt: Option<f64>,

    /// Velocity disturbance scale
    #[arg(long)]
    disturbance: Option<f64>,

    /// Velocity norm cap
    #[arg(long)]
    max_vel: Option<f64>,

    /// Disturbance seed
    #[arg(long)]
    seed: Option<u64>,

    /// Visualizer backend (null, log)
    #[arg(long)]
    visualizer: Option<String>,

    /// Logger backend (null, log)
    #[arg(long)]
    logger: Option<String>,

    /// Hover height in meters
    #[arg(long, default_value = "1.0")]
    height: f64,

    /// Enable collision avoidance on every agent
    #[arg(long)]
    avoid: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn apply(&self, config: &mut SimConfig) {
        if let Some(dt) = self.dt {
            config.dt = dt;
        }
        if let Some(disturbance) = self.disturbance {
            config.disturbance = disturbance;
        }
        if let Some(max_vel) = self.max_vel {
            config.max_vel = max_vel;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(visualizer) = &self.visualizer {
            config.visualizer.clone_from(visualizer);
        }
        if let Some(logger) = &self.logger {
            config.logger.clone_from(logger);
        }
    }

    fn records(&self) -> Result<Vec<AgentRecord>> {
        match &self.fleet {
            Some(path) => config::load_fleet(path)
                .with_context(|| format!("loading fleet file {}", path.display())),
            None => Ok((0..self.agents)
                .map(|i| AgentRecord::new(i + 1, [0.5 * f64::from(i), 0.0, 0.0]))
                .collect()),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = SimConfig::from_env();
    args.apply(&mut config);

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    if args.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let records = args.records()?;
    let clock = SimulationClock::from_config(&config)?;
    let mut swarm = Swarm::new(&records, clock)?;

    info!(
        "Starting swarm simulation: {} agents, dt {}s, disturbance {}",
        swarm.len(),
        config.dt,
        config.disturbance
    );

    if args.avoid {
        swarm.enable_collision_avoidance(CollisionParams::default());
    }

    let all = GroupMask::ALL;

    swarm.takeoff(args.height, 2.0, all);
    swarm.sleep(2.5);
    info!("Airborne at t={:.2}s", swarm.time());

    swarm.go_to(Vec3::new(0.5, 0.5, 0.0), 0.0, 2.0, all)?;
    swarm.sleep(2.5);
    info!("Moved at t={:.2}s", swarm.time());

    swarm.land(0.05, 2.0, all);
    swarm.sleep(2.5);
    swarm.stop(all);

    info!("Scenario complete after {} ticks", swarm.clock().ticks());
    for agent in swarm.agents() {
        let pos = agent.position();
        println!(
            "{:>4}  {:>20}  x={:+.3} y={:+.3} z={:+.3}",
            agent.id(),
            agent.mode().as_str(),
            pos.x,
            pos.y,
            pos.z
        );
    }

    Ok(())
}
