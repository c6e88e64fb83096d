use clap::Parser;

use petri_hybrid::deadlock::{DeadlockVerdict, HybridSearch};
use petri_hybrid::net::PetriNet;
use petri_hybrid::reach::{reachable_set, ReachOptions};

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Number of philosophers.
    #[arg(value_name = "INT", default_value = "3")]
    n: usize,
}

/// Dining philosophers, the deadlock-prone variant: every philosopher picks
/// up the left fork first, so the state where everyone holds exactly one
/// fork is a reachable deadlock.
fn philosophers(n: usize) -> color_eyre::Result<PetriNet> {
    let mut net = PetriNet::new();

    let thinking: Vec<_> = (0..n)
        .map(|i| net.add_place(format!("thinking_{}", i)))
        .collect::<Result<_, _>>()?;
    let fork: Vec<_> = (0..n)
        .map(|i| net.add_place(format!("fork_{}", i)))
        .collect::<Result<_, _>>()?;
    let has_left: Vec<_> = (0..n)
        .map(|i| net.add_place(format!("has_left_{}", i)))
        .collect::<Result<_, _>>()?;
    let eating: Vec<_> = (0..n)
        .map(|i| net.add_place(format!("eating_{}", i)))
        .collect::<Result<_, _>>()?;

    for i in 0..n {
        let right = (i + 1) % n;
        net.add_transition(
            format!("take_left_{}", i),
            [thinking[i], fork[i]],
            [has_left[i]],
        )?;
        net.add_transition(
            format!("take_right_{}", i),
            [has_left[i], fork[right]],
            [eating[i]],
        )?;
        net.add_transition(
            format!("put_down_{}", i),
            [eating[i]],
            [thinking[i], fork[i], fork[right]],
        )?;
        net.mark_initial(thinking[i])?;
        net.mark_initial(fork[i])?;
    }

    Ok(net)
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let net = philosophers(args.n)?;
    println!(
        "net: {} places, {} transitions",
        net.num_places(),
        net.num_transitions()
    );

    let reach = reachable_set(&net, ReachOptions::default())?;
    println!(
        "reachable markings: {} ({} BDD nodes, {} iterations)",
        reach.count(),
        reach.bdd_size(),
        reach.iterations()
    );

    let mut search = HybridSearch::new(&net);
    match search.run()? {
        DeadlockVerdict::DeadlockAt(m) => {
            println!("deadlock found: {}", net.format_marking(&m));
        }
        DeadlockVerdict::NoDeadlock => {
            println!("no deadlock is reachable");
        }
        DeadlockVerdict::Inconclusive(reason) => {
            println!("inconclusive: {}", reason);
        }
    }
    println!("cuts added: {}", search.cuts_added());

    let time_total = time_total.elapsed();
    println!("All done in {:.3} s", time_total.as_secs_f64());

    Ok(())
}
