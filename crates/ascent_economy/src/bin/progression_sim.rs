//! # Progression Simulation
//!
//! Runs a population of bots through simulated days of play against the
//! in-memory ledger and prints where the economy ends up.
//!
//! Each simulated hour the clock advances, then every bot (on a worker
//! thread) decides whether to claim and whether to level up. Decisions come
//! from a per-bot ChaCha RNG, so a given seed always produces the same run.
//!
//! ```text
//! progression_sim [BOTS] [HOURS] [WORKERS] [SEED]
//! ```
//!
//! Set `ASCENT_CONFIG` to load an economy TOML instead of the defaults.
//!
//! Build with: cargo run --release --features sim --bin progression_sim

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ascent_economy::{
    EconomyConfig, EconomyError, Identity, InMemoryLedger, ManualClock, ProgressionEngine,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_BOTS: usize = 256;
const DEFAULT_HOURS: u64 = 72;
const DEFAULT_WORKERS: usize = 8;
const DEFAULT_SEED: u64 = 0xA5CE_0001;
const SIM_START: u64 = 1_700_000_000;

/// Chance a bot shows up to claim in a given hour.
const CLAIM_PROBABILITY: f64 = 0.7;
/// Chance a bot that can afford the next level buys it.
const LEVEL_UP_PROBABILITY: f64 = 0.5;

type SimEngine = ProgressionEngine<Arc<InMemoryLedger>, Arc<ManualClock>>;

#[derive(Default)]
struct Tally {
    claims: AtomicU64,
    level_ups: AtomicU64,
    too_early: AtomicU64,
    unaffordable: AtomicU64,
    other_errors: AtomicU64,
}

impl Tally {
    fn record(&self, err: &EconomyError) {
        let counter = match err {
            EconomyError::ClaimTooEarly { .. } => &self.too_early,
            EconomyError::CantAffordLevelUp { .. } => &self.unaffordable,
            _ => {
                tracing::warn!("unexpected error: {}", err);
                &self.other_errors
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct Bot {
    identity: Identity,
    rng: ChaCha8Rng,
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false),
        )
        .init();
}

fn arg_or<T: std::str::FromStr>(args: &[String], index: usize, default: T) -> T {
    args.get(index)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn bot_identity(index: usize) -> Identity {
    let mut bytes = [0u8; 20];
    bytes[0] = 0xB0;
    bytes[12..].copy_from_slice(&(index as u64).to_be_bytes());
    Identity::from(bytes)
}

fn play_hour(engine: &SimEngine, bot: &mut Bot, tally: &Tally) {
    if bot.rng.gen_bool(CLAIM_PROBABILITY) {
        match engine.claim_tokens(bot.identity) {
            Ok(_) => {
                tally.claims.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => tally.record(&err),
        }
    }

    // Some bots try even when they cannot pay, to exercise the rejection path.
    let affordable = engine.afford_level_up(&bot.identity).unwrap_or(false);
    if (affordable && bot.rng.gen_bool(LEVEL_UP_PROBABILITY)) || bot.rng.gen_bool(0.05) {
        match engine.level_up(bot.identity) {
            Ok(_) => {
                tally.level_ups.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => tally.record(&err),
        }
    }
}

fn main() -> Result<(), EconomyError> {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let bot_count = arg_or(&args, 1, DEFAULT_BOTS);
    let hours = arg_or(&args, 2, DEFAULT_HOURS);
    let workers = arg_or(&args, 3, DEFAULT_WORKERS).max(1);
    let seed = arg_or(&args, 4, DEFAULT_SEED);

    let config = match std::env::var("ASCENT_CONFIG") {
        Ok(path) => EconomyConfig::load(path)?,
        Err(_) => EconomyConfig::default(),
    };
    let interval = config.min_claim_interval_secs;

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         ASCENT - PROGRESSION ECONOMY SIMULATION                  ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();
    println!("┌─ CONFIGURATION ──────────────────────────────────────────────────┐");
    println!("│ Bots:               {bot_count}");
    println!("│ Simulated Hours:    {hours}");
    println!("│ Worker Threads:     {workers}");
    println!("│ Seed:               {seed:#x}");
    println!("│ Initial Tokens:     {}", config.initial_tokens);
    println!("│ Claim Interval:     {interval}s");
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let ledger = Arc::new(InMemoryLedger::with_metadata(config.token.clone()));
    let clock = Arc::new(ManualClock::new(SIM_START));
    let engine: SimEngine = ProgressionEngine::new(Arc::clone(&ledger), Arc::clone(&clock), config)?;

    let mut bots: Vec<Bot> = (0..bot_count)
        .map(|index| Bot {
            identity: bot_identity(index),
            rng: ChaCha8Rng::seed_from_u64(seed.wrapping_add(index as u64)),
        })
        .collect();
    for bot in &bots {
        engine.create_player(bot.identity)?;
    }
    tracing::info!("{} bots created", engine.player_count());

    let tally = Tally::default();
    let chunk = bot_count.div_ceil(workers).max(1);
    let start = Instant::now();

    for hour in 1..=hours {
        clock.advance(interval);
        std::thread::scope(|scope| {
            for group in bots.chunks_mut(chunk) {
                let engine = &engine;
                let tally = &tally;
                scope.spawn(move || {
                    for bot in group {
                        play_hour(engine, bot, tally);
                    }
                });
            }
        });
        if hour % 24 == 0 {
            tracing::info!(
                "day {} done: {} claims, {} level-ups so far",
                hour / 24,
                tally.claims.load(Ordering::Relaxed),
                tally.level_ups.load(Ordering::Relaxed)
            );
        }
    }

    let elapsed = start.elapsed();
    let events = engine.drain_events();
    let stats = engine.stats();
    let players = engine.players();
    let max_level = players.iter().map(|(_, p)| p.level).max().unwrap_or(0);
    let level_sum: u64 = players.iter().map(|(_, p)| p.level).sum();
    let richest = players
        .iter()
        .map(|(identity, _)| engine.balance_of(identity))
        .max()
        .unwrap_or(0);

    println!();
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                    SIMULATION RESULTS                            ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();
    println!("┌─ TIMING ─────────────────────────────────────────────────────────┐");
    println!("│ Real Time:          {:.3} seconds", elapsed.as_secs_f64());
    println!("│ Simulated Time:     {hours} hours");
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();
    println!("┌─ ACTIVITY ───────────────────────────────────────────────────────┐");
    println!("│ Claims:             {}", stats.claims);
    println!("│ Level-ups:          {}", stats.level_ups);
    println!("│ Too Early:          {}", tally.too_early.load(Ordering::Relaxed));
    println!("│ Unaffordable:       {}", tally.unaffordable.load(Ordering::Relaxed));
    println!("│ Rollbacks:          {}", stats.rollbacks);
    println!("│ Events Emitted:     {}", events.len());
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();
    println!("┌─ ECONOMY ────────────────────────────────────────────────────────┐");
    println!("│ Players:            {}", players.len());
    println!("│ Highest Level:      {max_level}");
    println!(
        "│ Average Level:      {:.2}",
        level_sum as f64 / players.len().max(1) as f64
    );
    println!("│ Richest Balance:    {richest}");
    println!("│ Total Supply:       {} {}", ledger.total_supply(), engine.config().token.symbol);
    println!("└──────────────────────────────────────────────────────────────────┘");

    let other = tally.other_errors.load(Ordering::Relaxed);
    if other > 0 || stats.rollbacks > 0 {
        tracing::error!("{} unexpected errors, {} rollbacks", other, stats.rollbacks);
    }
    Ok(())
}
