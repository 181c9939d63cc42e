use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use kinship_graph::{
    config::Config,
    consistency::{InvariantViolation, RepairReport},
    store::{GraphSnapshot, InMemoryStore},
    traversal::{
        LineagePathResult, PartnerMatchRequest, PartnerMatchResult, RelativesRequest,
        RelativesResult,
    },
    types::*,
    KinshipService,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "kinship-graph")]
#[command(about = "Kinship graph queries: lineage paths, partner matches and relatives networks")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Graph snapshot (JSON or YAML); overrides store.snapshot_path
    #[arg(short, long, global = true)]
    graph: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Output format (json, text)
    #[arg(short, long, default_value = "text", global = true)]
    output: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Shortest relationship path and nearest common ancestor of two persons
    Lineage {
        person_a: PersonId,
        person_b: PersonId,
    },

    /// Eligible partners reachable from a seeker
    Partners {
        seeker: PersonId,

        /// Gender code of candidates (e.g. M, F)
        #[arg(long)]
        gender: String,

        #[arg(long)]
        max_depth: Option<Depth>,

        #[arg(long)]
        birth_year_min: Option<i32>,

        #[arg(long)]
        birth_year_max: Option<i32>,

        #[arg(long, value_delimiter = ',')]
        religion: Vec<i64>,

        #[arg(long, value_delimiter = ',')]
        religion_category: Vec<i64>,

        /// Allowed gotras (religion sub-categories)
        #[arg(long, value_delimiter = ',')]
        gotra: Vec<i64>,

        /// Gotras that rule a candidate out
        #[arg(long, value_delimiter = ',')]
        exclude_gotra: Vec<i64>,

        /// Keep only the branches leading to a match
        #[arg(long)]
        prune: bool,
    },

    /// Relatives within or exactly at a hop depth
    Relatives {
        person: PersonId,

        #[arg(long, default_value_t = 1)]
        depth: Depth,

        /// up_to or only_at
        #[arg(long, default_value = "up_to")]
        mode: String,

        /// Include persons with a death year
        #[arg(long)]
        include_deceased: bool,

        #[arg(long)]
        gender_id: Option<GenderId>,

        #[arg(long)]
        country_id: Option<i64>,

        #[arg(long)]
        state_id: Option<i64>,

        #[arg(long)]
        district_id: Option<i64>,

        #[arg(long)]
        sub_district_id: Option<i64>,

        #[arg(long)]
        locality_id: Option<i64>,
    },

    /// Create a relationship and its inverse
    Link {
        person: PersonId,
        related: PersonId,
        /// FATHER, MOTHER, SON, DAUGHTER, HUSBAND, WIFE or SPOUSE
        relationship: String,
    },

    /// Change the active flag or dates of a relationship pair
    UpdateLink {
        edge_id: EdgeId,

        #[arg(long)]
        active: Option<bool>,

        #[arg(long)]
        start_date: Option<NaiveDate>,

        #[arg(long)]
        end_date: Option<NaiveDate>,
    },

    /// Delete a relationship and its inverse
    Unlink { edge_id: EdgeId },

    /// Synthesize missing inverse edges
    Repair {
        /// Write the repaired graph back to the snapshot
        #[arg(long)]
        write: bool,
    },

    /// Report edges whose inverse is missing or wrong
    Check,

    /// Initialize configuration file
    Init {
        /// Configuration file path
        #[arg(long, default_value = "kinship.yml")]
        config_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(&cli.log_level)?;

    if let Commands::Init { config_file } = &cli.command {
        return init_config(config_file).await;
    }

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let graph_path = cli
        .graph
        .clone()
        .or_else(|| config.store.snapshot_path.clone())
        .context("No graph snapshot given; pass --graph or set store.snapshot_path")?;

    let store = Arc::new(load_store(&graph_path)?);
    let service = KinshipService::in_memory(store.clone(), &config);
    let output = cli.output.as_str();

    match cli.command {
        Commands::Lineage { person_a, person_b } => {
            let result = service.find_lineage_path(person_a, person_b).await?;
            print_output(&result, output, format_lineage)?;
        }

        Commands::Partners {
            seeker,
            gender,
            max_depth,
            birth_year_min,
            birth_year_max,
            religion,
            religion_category,
            gotra,
            exclude_gotra,
            prune,
        } => {
            let request = PartnerMatchRequest {
                seeker_id: seeker,
                target_gender_code: gender,
                max_depth,
                birth_year_min,
                birth_year_max,
                religion_ids: religion,
                religion_category_ids: religion_category,
                religion_sub_category_ids: gotra,
                exclude_sub_category_ids: exclude_gotra,
                prune_graph: prune,
            };
            let result = service.find_partner_matches(&request).await?;
            print_output(&result, output, format_partners)?;
        }

        Commands::Relatives {
            person,
            depth,
            mode,
            include_deceased,
            gender_id,
            country_id,
            state_id,
            district_id,
            sub_district_id,
            locality_id,
        } => {
            let request = RelativesRequest {
                person_id: person,
                depth,
                depth_mode: mode,
                living_only: include_deceased.then_some(false),
                gender_id,
                country_id,
                state_id,
                district_id,
                sub_district_id,
                locality_id,
            };
            let result = service.find_relatives_network(&request).await?;
            print_output(&result, output, format_relatives)?;
        }

        Commands::Link {
            person,
            related,
            relationship,
        } => {
            let relationship_type: RelationshipType = relationship.parse()?;
            let pair = service.create_link(person, related, relationship_type).await?;
            save_store(&store, &graph_path).await?;
            print_output(&pair, output, format_pair)?;
        }

        Commands::UpdateLink {
            edge_id,
            active,
            start_date,
            end_date,
        } => {
            let update = EdgeUpdate {
                is_active: active,
                start_date,
                end_date,
                relationship_type: None,
            };
            let pair = service.update_link(edge_id, update).await?;
            save_store(&store, &graph_path).await?;
            print_output(&pair, output, format_pair)?;
        }

        Commands::Unlink { edge_id } => {
            service.delete_link(edge_id).await?;
            save_store(&store, &graph_path).await?;
            println!("Deleted relationship {} and its inverse", edge_id);
        }

        Commands::Repair { write } => {
            let report = service.repair().await?;
            if write {
                save_store(&store, &graph_path).await?;
            } else if report.synthesized > 0 {
                warn!("Dry run: pass --write to persist {} synthesized edges", report.synthesized);
            }
            print_output(&report, output, format_repair)?;
        }

        Commands::Check => {
            let violations = service.check().await?;
            print_output(&violations, output, |v: &Vec<InvariantViolation>| format_violations(v))?;
            if !violations.is_empty() {
                error!("❌ {} consistency violations found", violations.len());
                std::process::exit(1);
            }
        }

        // Handled before the graph is loaded
        Commands::Init { .. } => {}
    }

    Ok(())
}

/// Initialize tracing with the specified log level
fn init_tracing(log_level: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Failed to create env filter")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_level(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}

fn load_store(path: &Path) -> Result<InMemoryStore> {
    let snapshot = GraphSnapshot::load_from_file(path)?;
    InMemoryStore::from_snapshot(snapshot)
        .with_context(|| format!("Graph snapshot {:?} is inconsistent", path))
}

async fn save_store(store: &InMemoryStore, path: &Path) -> Result<()> {
    store.snapshot().await.save_to_file(path)
}

/// Initialize configuration file
async fn init_config(config_file: &Path) -> Result<()> {
    info!("Initializing configuration file: {:?}", config_file);

    if config_file.exists() {
        warn!("Configuration file already exists: {:?}", config_file);
        print!("Overwrite existing file? (y/N): ");
        use std::io::{self, Write};
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().to_lowercase().starts_with('y') {
            info!("Configuration initialization cancelled");
            return Ok(());
        }
    }

    Config::default()
        .save_to_file(config_file)
        .await
        .with_context(|| format!("Failed to write configuration file: {:?}", config_file))?;

    info!("Configuration file created successfully: {:?}", config_file);
    println!("Configuration file created: {:?}", config_file);
    println!("Set store.snapshot_path to your graph snapshot, or pass --graph.");

    Ok(())
}

/// Print a result as pretty JSON or through its text formatter
fn print_output<T: Serialize>(value: &T, format: &str, text: impl Fn(&T) -> String) -> Result<()> {
    let content = match format.to_lowercase().as_str() {
        "json" => serde_json::to_string_pretty(value)?,
        "text" => text(value),
        _ => {
            warn!("Unknown output format '{}', using text", format);
            text(value)
        }
    };
    println!("{}", content);
    Ok(())
}

fn join_ids(ids: &[PersonId]) -> String {
    if ids.is_empty() {
        return "-".to_string();
    }
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(" -> ")
}

fn format_lineage(result: &LineagePathResult) -> String {
    let mut out = format!(
        "Lineage {} <-> {}\n{}\n",
        result.person_a_id, result.person_b_id, result.message
    );
    if let Some(meeting) = result.meeting_person_id {
        out.push_str(&format!("Meeting person: {}\n", meeting));
    }
    if let Some(ancestor) = result.common_ancestor_id {
        out.push_str(&format!("Common ancestor: {}\n", ancestor));
    }
    if let Some(distance) = result.distance {
        out.push_str(&format!("Distance: {} hops\n", distance));
    }
    out.push_str(&format!("Path from A: {}\n", join_ids(&result.path_a_to_common)));
    out.push_str(&format!("Path from B: {}\n", join_ids(&result.path_b_to_common)));
    out.push_str(&format!("Persons visited: {}", result.graph.len()));
    out
}

fn format_partners(result: &PartnerMatchResult) -> String {
    let mut out = format!(
        "Partner matches for {}: {}\n",
        result.seeker_id, result.total_matches
    );
    for person_id in &result.matches {
        let node = match result.exploration_graph.get(person_id) {
            Some(node) => node,
            None => continue,
        };
        let name = node
            .person
            .as_ref()
            .map(|p| format!("{} {}", p.first_name, p.last_name))
            .unwrap_or_default();
        let via = node
            .from_person
            .as_ref()
            .map(|from| format!(" via {} ({})", from.person_id, from.relationship_type))
            .unwrap_or_default();
        out.push_str(&format!(
            "  {} {} [depth {}]{}\n",
            person_id,
            name.trim(),
            node.depth,
            via
        ));
    }
    out.push_str(&format!("Persons explored: {}", result.exploration_graph.len()));
    out
}

fn format_relatives(result: &RelativesResult) -> String {
    let mut out = format!(
        "Relatives of {} ({} {}): {}\n",
        result.person_id, result.depth_mode, result.depth, result.total_count
    );
    for relative in &result.relatives {
        out.push_str(&format!(
            "  {} {} {} [depth {}] via {} ({})\n",
            relative.person_id,
            relative.first_name,
            relative.last_name,
            relative.depth,
            relative.from_person_id,
            relative.relationship_type
        ));
    }
    out.trim_end().to_string()
}

fn format_edge(edge: &KinshipEdge) -> String {
    format!(
        "#{} {} -[{}]-> {}{}",
        edge.edge_id,
        edge.person_id,
        edge.relationship_type,
        edge.related_person_id,
        if edge.is_active { "" } else { " (inactive)" }
    )
}

fn format_pair(pair: &EdgePair) -> String {
    match &pair.inverse {
        Some(inverse) => format!("{}\n{}", format_edge(&pair.primary), format_edge(inverse)),
        None => format!("{}\n(no inverse row)", format_edge(&pair.primary)),
    }
}

fn format_repair(report: &RepairReport) -> String {
    let mut out = format!(
        "Scanned {} edges: {} inverses synthesized, {} unresolved\n",
        report.scanned, report.synthesized, report.unresolved
    );
    for warning in &report.warnings {
        out.push_str(&format!("  {}\n", warning));
    }
    out.trim_end().to_string()
}

fn format_violations(violations: &[InvariantViolation]) -> String {
    if violations.is_empty() {
        return "✅ Every edge has a matching inverse".to_string();
    }
    let mut out = format!("{} consistency violations:\n", violations.len());
    for violation in violations {
        out.push_str(&format!("  {}\n", violation));
    }
    out.trim_end().to_string()
}
