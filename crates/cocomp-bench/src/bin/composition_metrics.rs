use std::path::PathBuf;

use cocomp_bench::{fan_in, relay_catalog, relay_chain};
use cocomp_solver::{Solution, SolveError, Solver, report};
use cocomp_types::Substitution;
use serde_json::json;

struct WorkloadMetric {
    name: &'static str,
    steps: usize,
    trace_events: usize,
    operations: usize,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let solver = Solver::default();
    let (catalog, names) = relay_catalog(64);
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let metrics = vec![
        measure(
            "relay_chain_64",
            solver.solve(relay_chain(64), &Substitution::new()),
        )?,
        measure("fan_in_64", solver.solve(fan_in(64), &Substitution::new()))?,
        measure("relay_catalog_64", catalog.compose(&solver, &names, &[]))?,
    ];
    let total_steps: usize = metrics.iter().map(|m| m.steps).sum();
    let workloads: Vec<_> = metrics
        .iter()
        .map(|m| {
            json!({
                "name": m.name,
                "steps": m.steps,
                "trace_events": m.trace_events,
                "operations": m.operations,
            })
        })
        .collect();
    let rendered = serde_json::to_string_pretty(&json!({
        "workloads": workloads,
        "total_steps": total_steps,
    }))
    .map_err(|err| format!("failed to render metrics: {err}"))?;

    if let Some(path) = std::env::args().nth(1) {
        let path = PathBuf::from(path);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|err| format!("failed to create `{}`: {err}", parent.display()))?;
        }
        std::fs::write(&path, rendered)
            .map_err(|err| format!("failed to write `{}`: {err}", path.display()))?;
    } else {
        println!("{rendered}");
    }

    Ok(())
}

fn measure(
    name: &'static str,
    outcome: Result<Solution, SolveError>,
) -> Result<WorkloadMetric, String> {
    let solution = outcome.map_err(|err| format!("workload `{name}` failed: {err}"))?;
    Ok(WorkloadMetric {
        name,
        steps: solution.steps,
        trace_events: solution.trace.len(),
        operations: report::operations(&solution.trace).len(),
    })
}
