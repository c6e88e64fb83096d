use petri_hybrid::deadlock::{DeadlockVerdict, HybridSearch};
use petri_hybrid::explicit;
use petri_hybrid::net::PetriNet;
use petri_hybrid::reach::{reachable_set, ReachOptions};

/// A token circulating between two places: every reachable marking enables
/// a transition, so the net is deadlock-free and the state-equation
/// relaxation proves it without a single cut.
fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Debug,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let mut net = PetriNet::new();
    let p1 = net.add_place("p1")?;
    let p2 = net.add_place("p2")?;
    net.add_transition("t1", [p1], [p2])?;
    net.add_transition("t2", [p2], [p1])?;
    net.mark_initial(p1)?;

    let reach = reachable_set(&net, ReachOptions::default())?;
    println!("reachable markings: {}", reach.count());
    for m in reach.markings() {
        println!("  {} = {}", m, net.format_marking(&m));
    }

    // Cross-check against plain breadth-first enumeration.
    let explicit = explicit::reachable_markings(&net)?;
    assert_eq!(explicit.len(), 2);
    for m in &explicit {
        assert!(reach.contains(m));
    }

    let mut search = HybridSearch::new(&net);
    match search.run()? {
        DeadlockVerdict::NoDeadlock => println!("no deadlock is reachable"),
        other => println!("unexpected verdict: {:?}", other),
    }
    println!("cuts added: {}", search.cuts_added());

    Ok(())
}
