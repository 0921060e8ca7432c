//! Lodepool simulation binary.
//!
//! Runs a deterministic multi-participant staking scenario against the
//! engine's public surface and prints the resulting stats bundles and
//! the audit snapshot as JSON.

use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use lodepool::{
    now_secs, Address, EngineConfig, FeeApplies, InMemoryBank, LeaderboardKey, MiningEngine,
    TokenAmount,
};

fn addr(byte: u8) -> Address {
    Address::from_bytes([byte; 20])
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string())),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let admin = addr(0x01);
    let treasury = addr(0x02);
    let custody = addr(0x03);
    let reward_token = addr(0x10);
    let gold_token = addr(0x11);
    let silver_token = addr(0x12);
    let alice = addr(0xA1);
    let bob = addr(0xB2);
    let carol = addr(0xC3);

    let cap = TokenAmount::from_whole(1_000_000);

    let mut bank = InMemoryBank::new();
    bank.mint(reward_token, custody, cap);
    for participant in [alice, bob, carol] {
        bank.mint(gold_token, participant, TokenAmount::from_whole(10_000));
        bank.mint(silver_token, participant, TokenAmount::from_whole(10_000));
    }

    let mut engine = MiningEngine::new(
        EngineConfig {
            admin,
            treasury,
            reward_asset: reward_token,
            custody,
            reward_supply_cap: cap,
            emission_rate: TokenAmount::from_whole(10),
            fee_bps: 250,
            fee_applies: FeeApplies::Reward,
        },
        bank,
    )?;

    // One day of emissions across two pools, weighted 3:1, anchored at
    // the current wall clock
    let t0 = now_secs();
    let gold = engine.create_pool(admin, gold_token, 300, t0, t0 + 86_400, t0)?;
    let silver = engine.create_pool(admin, silver_token, 100, t0, t0 + 86_400, t0)?;

    engine.stake(alice, gold, TokenAmount::from_whole(1_000), t0)?;
    engine.stake(bob, gold, TokenAmount::from_whole(3_000), t0)?;
    engine.stake(carol, silver, TokenAmount::from_whole(500), t0 + 600)?;

    // An hour in, alice compounds her position and bob takes profits
    let t1 = t0 + 3_600;
    engine.stake(alice, gold, TokenAmount::from_whole(2_000), t1)?;
    let receipt = engine.withdraw(bob, gold, TokenAmount::from_whole(1_000), t1)?;
    info!(reward = %receipt.reward_net, "bob withdrew with reward");

    // Carol bails out entirely, forfeiting her accrued reward
    let t2 = t0 + 7_200;
    let exit = engine.emergency_withdraw(carol, silver, t2)?;
    info!(principal = %exit.principal, forfeited = %exit.forfeited, "carol exited");

    engine.claim(alice, gold, t2)?;

    let now = t0 + 10_800;
    let stats = engine.program_stats(now);
    println!("{}", serde_json::to_string_pretty(&stats)?);

    for pool_id in [gold, silver] {
        let pool_stats = engine.pool_stats(pool_id, now)?;
        println!("{}", serde_json::to_string_pretty(&pool_stats)?);
    }

    let leaderboard = engine.top_participants(10, LeaderboardKey::LifetimeRewards);
    println!("{}", serde_json::to_string_pretty(&leaderboard)?);

    println!("{}", engine.audit_snapshot_json()?);

    Ok(())
}
