use simulation::{run_simulation, simulate_scaling};
use tracing_subscriber::EnvFilter;

pub mod simulation;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(async_main()) {
        eprintln!("simulation failed: {}", e);
        std::process::exit(1);
    }
}

async fn async_main() -> stablecast_sdk::Result<()> {
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            IN-MEMORY GROUP SIMULATIONS                     ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    // The classic three-member group
    run_simulation(3, 100).await?.print();

    run_simulation(5, 500).await?.print();

    run_simulation(10, 1000).await?.print();

    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║          SCALING ANALYSIS                                  ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    simulate_scaling(16, 4, 200).await?;

    println!("\n✓ All simulations completed successfully!");
    Ok(())
}
