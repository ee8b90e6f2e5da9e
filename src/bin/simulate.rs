use clap::Parser;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use wirebox_puzzle::completion::MemoryCompletionStore;
use wirebox_puzzle::constants::TICK_MS;
use wirebox_puzzle::evaluator::trace;
use wirebox_puzzle::highlight::{HighlightSet, HighlightTarget};
use wirebox_puzzle::layout::{demo_layouts, load_layout, PuzzleLayout};
use wirebox_puzzle::puzzle::{PuzzleOptions, WirePuzzle};
use wirebox_puzzle::registry::PuzzleRegistry;
use wirebox_puzzle::rng::Rng;
use wirebox_puzzle::types::{
    ClickOutcome, ClickTarget, EvaluationMode, NodeId, RemovalPolicy, WireId,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Drive random click sessions through wire-box puzzles")]
struct Cli {
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = 400)]
    clicks: usize,
    #[arg(long)]
    layout: Option<PathBuf>,
    #[arg(long)]
    removal_policy: Option<String>,
    #[arg(long)]
    polling: bool,
    #[arg(long)]
    match_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug)]
struct Scenario {
    layout: PuzzleLayout,
    seed: u32,
    clicks: usize,
    options: PuzzleOptions,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    seed: u32,
    clicks: usize,
    #[serde(rename = "connectionsPlaced")]
    connections_placed: usize,
    rejections: usize,
    removals: usize,
    ignored: usize,
    completed: bool,
    #[serde(rename = "completedAtClick")]
    completed_at_click: Option<usize>,
    #[serde(rename = "finalCharge")]
    final_charge: i32,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    click: usize,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioRunResult {
    #[serde(flatten)]
    result: ScenarioResultLine,
    #[serde(rename = "anomalyRecords")]
    anomaly_records: Vec<AnomalyRecord>,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "completedCount")]
    completed_count: usize,
    scenarios: Vec<ScenarioResultLine>,
}

#[derive(Clone, Debug, Serialize)]
struct StructuredLogLine {
    #[serde(rename = "timestampMs")]
    timestamp_ms: u64,
    level: String,
    event: String,
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
    details: Value,
}

fn main() {
    let cli = Cli::parse();
    let run_started_at_ms = now_ms();
    let scenarios = match resolve_scenarios(&cli) {
        Ok(scenarios) => scenarios,
        Err(message) => {
            emit_log("error", "setup_failed", "-", None, None, json!({ "error": message }));
            std::process::exit(2);
        }
    };
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let match_id = cli
        .match_id
        .clone()
        .unwrap_or_else(|| default_match_id(seed_hint, run_started_at_ms));

    let mut scenario_results = Vec::new();
    let mut total_anomalies = 0usize;
    for scenario in scenarios {
        let name = scenario.layout.name.clone();
        emit_log(
            "info",
            "scenario_started",
            &match_id,
            Some(&name),
            Some(scenario.seed),
            json!({
                "clicks": scenario.clicks,
                "removalPolicy": scenario.options.removal_policy,
                "evaluationMode": scenario.options.evaluation_mode,
            }),
        );
        let run = match run_scenario(&scenario) {
            Ok(run) => run,
            Err(message) => {
                emit_log(
                    "error",
                    "scenario_setup_failed",
                    &match_id,
                    Some(&name),
                    Some(scenario.seed),
                    json!({ "error": message }),
                );
                std::process::exit(2);
            }
        };
        for anomaly in &run.anomaly_records {
            emit_log(
                "warn",
                "anomaly_detected",
                &match_id,
                Some(&name),
                Some(scenario.seed),
                json!({ "click": anomaly.click, "message": anomaly.message }),
            );
        }
        total_anomalies += run.anomaly_records.len();
        emit_log(
            "info",
            "scenario_finished",
            &match_id,
            Some(&name),
            Some(scenario.seed),
            json!({
                "completed": run.result.completed,
                "completedAtClick": run.result.completed_at_click,
                "anomalyCount": run.anomaly_records.len(),
            }),
        );
        match serde_json::to_string(&run.result) {
            Ok(line) => println!("{line}"),
            Err(error) => eprintln!("failed to serialize scenario result: {error}"),
        }
        scenario_results.push(run.result);
    }

    let summary = build_run_summary(
        match_id.clone(),
        run_started_at_ms,
        now_ms(),
        scenario_results,
        total_anomalies,
    );
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            emit_log(
                "error",
                "summary_write_failed",
                &match_id,
                None,
                None,
                json!({ "path": path.to_string_lossy(), "error": error.to_string() }),
            );
            std::process::exit(2);
        }
    }
    emit_log(
        "info",
        "run_finished",
        &match_id,
        None,
        None,
        json!({
            "scenarioCount": summary.scenario_count,
            "anomalyCount": summary.anomaly_count,
            "completedCount": summary.completed_count,
        }),
    );

    if total_anomalies > 0 {
        std::process::exit(1);
    }
}

fn resolve_scenarios(cli: &Cli) -> Result<Vec<Scenario>, String> {
    let seed = normalize_seed(cli.seed.unwrap_or_else(now_ms));
    let removal_policy = match cli.removal_policy.as_deref() {
        None => RemovalPolicy::Refund,
        Some(raw) => RemovalPolicy::parse(raw)
            .ok_or_else(|| format!("unknown removal policy '{raw}'"))?,
    };
    let options = PuzzleOptions {
        removal_policy,
        evaluation_mode: if cli.polling {
            EvaluationMode::Polling
        } else {
            EvaluationMode::OnChange
        },
    };
    let layouts = match cli.layout.as_ref() {
        Some(path) => vec![load_layout(path).map_err(|error| error.to_string())?],
        None => demo_layouts(),
    };
    Ok(layouts
        .into_iter()
        .enumerate()
        .map(|(index, layout)| Scenario {
            layout,
            seed: normalize_seed(seed as u64 + index as u64),
            clicks: cli.clicks.max(1),
            options,
        })
        .collect())
}

fn run_scenario(scenario: &Scenario) -> Result<ScenarioRunResult, String> {
    let mut registry = PuzzleRegistry::new();
    let key = registry.register(&scenario.layout.name);
    let mut store = MemoryCompletionStore::default();
    let mut puzzle = WirePuzzle::new(&scenario.layout, key, scenario.options, &store)
        .map_err(|error| error.to_string())?;
    let highlights = Arc::new(Mutex::new(HighlightSet::default()));
    puzzle.set_highlighter(Box::new(highlights.clone()));
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    puzzle.on_completed(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let mut rng = Rng::new(scenario.seed);
    let mut result = ScenarioResultLine {
        scenario: scenario.layout.name.clone(),
        seed: scenario.seed,
        clicks: scenario.clicks,
        connections_placed: 0,
        rejections: 0,
        removals: 0,
        ignored: 0,
        completed: false,
        completed_at_click: None,
        final_charge: 0,
        anomalies: Vec::new(),
    };
    let mut anomaly_records = Vec::new();
    let mut anomaly_seen = HashSet::new();

    for click in 0..scenario.clicks {
        let target = random_target(&puzzle, &mut rng);
        match puzzle.handle_click(target, &mut store) {
            ClickOutcome::Connected { .. } => result.connections_placed += 1,
            ClickOutcome::Rejected { .. } => result.rejections += 1,
            ClickOutcome::Removed { .. } => result.removals += 1,
            ClickOutcome::Ignored { .. } => result.ignored += 1,
            _ => {}
        }
        puzzle.step(TICK_MS, &mut store);
        if puzzle.is_completed() && result.completed_at_click.is_none() {
            result.completed_at_click = Some(click);
        }

        let highlighted = highlights
            .lock()
            .map(|set| set.active().collect::<Vec<_>>())
            .unwrap_or_default();
        for message in collect_puzzle_anomalies(&puzzle, &highlighted, fired.load(Ordering::SeqCst))
        {
            push_anomaly(
                &mut result.anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                click,
                message,
            );
        }
    }

    result.completed = puzzle.is_completed();
    result.final_charge = puzzle.charge().total;
    Ok(ScenarioRunResult {
        result,
        anomaly_records,
    })
}

fn random_target(puzzle: &WirePuzzle, rng: &mut Rng) -> ClickTarget {
    let roll = rng.unit();
    if roll < 0.55 {
        ClickTarget::Node(NodeId(rng.below(puzzle.graph().node_count())))
    } else if roll < 0.85 {
        ClickTarget::Wire(WireId(rng.below(puzzle.builder().catalog().entries().len())))
    } else if roll < 0.97 {
        let connections: Vec<_> = puzzle.graph().connections().map(|c| c.id).collect();
        match rng.pick(&connections) {
            Some(id) => ClickTarget::Connection(*id),
            None => ClickTarget::Nothing,
        }
    } else {
        ClickTarget::Nothing
    }
}

fn collect_puzzle_anomalies(
    puzzle: &WirePuzzle,
    highlighted: &[HighlightTarget],
    completions_fired: usize,
) -> Vec<String> {
    let mut anomalies = Vec::new();
    let graph = puzzle.graph();
    for node in graph.nodes() {
        if node.degree() > node.capacity() {
            anomalies.push(format!(
                "node {:?} over capacity: {}/{}",
                node.id,
                node.degree(),
                node.capacity()
            ));
        }
    }
    let degree_sum: usize = graph.nodes().iter().map(|node| node.degree()).sum();
    if degree_sum != graph.connection_count() * 2 {
        anomalies.push(format!(
            "degree sum {degree_sum} does not match {} connections",
            graph.connection_count()
        ));
    }

    let selected = puzzle
        .builder()
        .catalog()
        .views()
        .iter()
        .filter(|wire| wire.selected)
        .count();
    if selected > 1 {
        anomalies.push(format!("{selected} wires selected at once"));
    }
    if puzzle.anchor().is_some() && puzzle.selected_wire().is_none() {
        anomalies.push("anchor kept without a selected wire".to_string());
    }

    let expected_highlights: HashSet<HighlightTarget> = puzzle
        .anchor()
        .map(HighlightTarget::Node)
        .into_iter()
        .chain(puzzle.selected_wire().map(HighlightTarget::Wire))
        .collect();
    let actual_highlights: HashSet<HighlightTarget> = highlighted.iter().copied().collect();
    if expected_highlights != actual_highlights {
        anomalies.push(format!(
            "highlights {actual_highlights:?} differ from selection {expected_highlights:?}"
        ));
    }

    if trace(graph) != trace(graph) {
        anomalies.push("circuit trace is not deterministic".to_string());
    }
    if completions_fired > 1 {
        anomalies.push(format!("completion fired {completions_fired} times"));
    }
    if puzzle.is_completed() != (completions_fired == 1) {
        anomalies.push("completion flag and notifications disagree".to_string());
    }
    anomalies
}

fn normalize_seed(seed: u64) -> u32 {
    seed as u32
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    click: usize,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        click,
        message: message.clone(),
    });
    if anomaly_seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn default_match_id(seed: u32, timestamp_ms: u64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    match_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    scenarios: Vec<ScenarioResultLine>,
    anomaly_count: usize,
) -> RunSummary {
    let completed_count = scenarios.iter().filter(|line| line.completed).count();
    RunSummary {
        match_id,
        started_at_ms,
        finished_at_ms,
        scenario_count: scenarios.len(),
        anomaly_count,
        completed_count,
        scenarios,
    }
}

fn emit_log(
    level: &str,
    event: &str,
    match_id: &str,
    scenario: Option<&str>,
    seed: Option<u32>,
    details: Value,
) {
    let log_line = StructuredLogLine {
        timestamp_ms: now_ms(),
        level: level.to_string(),
        event: event.to_string(),
        match_id: match_id.to_string(),
        scenario: scenario.map(|value| value.to_string()),
        seed,
        details,
    };
    if let Ok(line) = serde_json::to_string(&log_line) {
        eprintln!("{line}");
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, summary_text)
}
