//! Command-line interface.
//!
//! One subcommand per pipeline stage, all operating on a session inside an
//! artifact store. `run` executes encode → train → distill from a YAML spec.

use crate::config::PipelineSpec;
use crate::distill::{
    distill, evaluate_model, evaluate_tree, finetune, tree_labels, FinetuneMode, FinetuneParams,
};
use crate::encode::{build_schema, encode, EncodeParams, EncodedDataset, FeatureSchema};
use crate::error::Result;
use crate::log::EventTable;
use crate::network::{MlpClassifier, Model, NetworkParams, TrainParams};
use crate::store::{artifact, ArtifactStore, FsStore};
use crate::tree::{PruneDirection, SerialTree, SurrogateTree, TreeParams};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// Interactive decision-tree distillation for process-event logs.
#[derive(Debug, Parser)]
#[command(name = "destilar", version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Store root and session id shared by every stage.
#[derive(Debug, Args)]
struct SessionArgs {
    /// Artifact store root directory.
    #[arg(long, default_value = "data")]
    store: PathBuf,
    /// Session id.
    #[arg(long)]
    session: String,
}

impl SessionArgs {
    fn store(&self) -> FsStore {
        FsStore::new(&self.store)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EvalTarget {
    Network,
    Tree,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print summary statistics of a CSV event log.
    Stats {
        /// CSV event log path.
        csv: PathBuf,
    },
    /// Build the feature schema and encode the log into train/test matrices.
    Encode {
        #[command(flatten)]
        session: SessionArgs,
        /// CSV event log path.
        #[arg(long)]
        csv: PathBuf,
        /// Categorical attribute columns.
        #[arg(long, value_delimiter = ',')]
        categorical: Vec<String>,
        /// Numerical attribute columns.
        #[arg(long, value_delimiter = ',')]
        numerical: Vec<String>,
        #[arg(long, default_value_t = 3)]
        prefix_length: usize,
        #[arg(long, default_value_t = 0.3)]
        test_size: f64,
        /// Randomize case assignment before the split.
        #[arg(long)]
        shuffle: bool,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Train the network on the encoded training partition.
    Train {
        #[command(flatten)]
        session: SessionArgs,
        /// Hidden layer widths.
        #[arg(long, value_delimiter = ',', default_values_t = [512, 256, 128, 64])]
        hidden: Vec<usize>,
        #[arg(long, default_value_t = 10)]
        epochs: usize,
        #[arg(long, default_value_t = 0.001)]
        learning_rate: f32,
        #[arg(long, default_value_t = 32)]
        batch_size: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Distill the network into a decision-tree surrogate.
    Distill {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(long, default_value_t = 0.001)]
        ccp_alpha: f64,
        #[arg(long)]
        max_depth: Option<usize>,
        #[arg(long, default_value_t = 2)]
        min_samples_split: usize,
        #[arg(long, default_value_t = 1)]
        min_samples_leaf: usize,
    },
    /// Render the current tree with node ids.
    Show {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Cut one branch of a node and collapse it into a leaf.
    Cut {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(long)]
        node_id: usize,
        /// left, right, or auto (prune the smaller side).
        #[arg(long, default_value = "auto")]
        direction: String,
    },
    /// Excise a node's subtree and retrain it from the reaching data.
    Retrain {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(long)]
        node_id: usize,
    },
    /// Move an internal node's decision boundary in place.
    Modify {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(long)]
        node_id: usize,
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        feature_index: Option<usize>,
    },
    /// Fine-tune the network toward the edited tree.
    Finetune {
        #[command(flatten)]
        session: SessionArgs,
        /// Label blending mode.
        #[arg(long, default_value = "changed_complete")]
        mode: String,
        #[arg(long, default_value_t = 10)]
        epochs: usize,
        #[arg(long, default_value_t = 1e-4)]
        learning_rate: f32,
        #[arg(long, default_value_t = 32)]
        batch_size: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Evaluate the network or the tree on the held-out partition.
    Eval {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(long, value_enum, default_value = "network")]
        target: EvalTarget,
    },
    /// Run encode → train → distill from a YAML pipeline spec.
    Run {
        #[command(flatten)]
        session: SessionArgs,
        /// Pipeline spec path.
        spec: PathBuf,
    },
}

/// Execute a parsed command.
pub fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Stats { csv } => cmd_stats(&csv),
        Command::Encode {
            session,
            csv,
            categorical,
            numerical,
            prefix_length,
            test_size,
            shuffle,
            seed,
        } => {
            let params = EncodeParams {
                test_size,
                prefix_length,
                shuffle,
                seed,
            };
            cmd_encode(&session, &csv, &categorical, &numerical, &params)
        }
        Command::Train {
            session,
            hidden,
            epochs,
            learning_rate,
            batch_size,
            seed,
        } => cmd_train(
            &session,
            &NetworkParams {
                hidden_units: hidden,
                seed,
            },
            &TrainParams {
                epochs,
                learning_rate,
                batch_size,
                seed,
            },
        ),
        Command::Distill {
            session,
            ccp_alpha,
            max_depth,
            min_samples_split,
            min_samples_leaf,
        } => cmd_distill(
            &session,
            &TreeParams {
                ccp_alpha,
                max_depth,
                min_samples_split,
                min_samples_leaf,
            },
        ),
        Command::Show { session } => cmd_show(&session),
        Command::Cut {
            session,
            node_id,
            direction,
        } => cmd_cut(&session, node_id, &direction),
        Command::Retrain { session, node_id } => cmd_retrain(&session, node_id),
        Command::Modify {
            session,
            node_id,
            threshold,
            feature_index,
        } => cmd_modify(&session, node_id, threshold, feature_index),
        Command::Finetune {
            session,
            mode,
            epochs,
            learning_rate,
            batch_size,
            seed,
        } => {
            let params = FinetuneParams {
                epochs,
                learning_rate,
                batch_size,
                mode: mode.parse::<FinetuneMode>()?,
                seed,
            };
            cmd_finetune(&session, &params)
        }
        Command::Eval { session, target } => cmd_eval(&session, target),
        Command::Run { session, spec } => cmd_run(&session, &spec),
    }
}

fn cmd_stats(csv: &Path) -> Result<()> {
    let table = EventTable::from_csv(csv)?;
    let stats = table.stats()?;
    println!("cases:           {}", stats.num_cases);
    println!("events:          {}", stats.num_events);
    println!("events per case: {:.2}", stats.events_per_case);
    println!("attributes:      {}", stats.attributes.join(", "));
    Ok(())
}

fn cmd_encode(
    session: &SessionArgs,
    csv: &Path,
    categorical: &[String],
    numerical: &[String],
    params: &EncodeParams,
) -> Result<()> {
    let store = session.store();
    let table = EventTable::from_csv(csv)?;
    let stats = table.stats()?;
    println!(
        "✓ Log loaded: {} cases, {} events",
        stats.num_cases, stats.num_events
    );

    let schema = build_schema(&table, categorical, numerical, params.prefix_length)?;
    let dataset = encode(&table, &schema, params)?;
    println!(
        "✓ Encoded: {} train / {} test examples, {} features, {} classes",
        dataset.x_train.nrows(),
        dataset.x_test.nrows(),
        schema.vector_width(),
        schema.n_classes()
    );

    store.save(&session.session, artifact::EVENT_LOG, &table)?;
    store.save(&session.session, artifact::SCHEMA, &schema)?;
    store.save(&session.session, artifact::DATASET, &dataset)?;
    println!("✓ Session '{}' ready", session.session);
    Ok(())
}

fn cmd_train(
    session: &SessionArgs,
    network: &NetworkParams,
    params: &TrainParams,
) -> Result<()> {
    let store = session.store();
    let schema: FeatureSchema = store.load(&session.session, artifact::SCHEMA)?;
    let dataset: EncodedDataset = store.load(&session.session, artifact::DATASET)?;

    let mut model = MlpClassifier::new(schema.vector_width(), schema.n_classes(), network)?;
    println!(
        "✓ Network built: {} parameters, hidden {:?}",
        model.num_parameters(),
        network.hidden_units
    );

    let report = model.train(&dataset.x_train, &dataset.y_train, params)?;
    println!(
        "✓ Trained {} epochs, final loss {:.6}",
        report.epochs,
        report.final_loss().unwrap_or(0.0)
    );

    let eval = evaluate_model(&model, &dataset.x_test, &dataset.y_test, &schema.class_names)?;
    println!("  Test accuracy: {:.4}", eval.accuracy);

    store.save(&session.session, artifact::NETWORK, &model)?;
    Ok(())
}

fn cmd_distill(session: &SessionArgs, params: &TreeParams) -> Result<()> {
    let store = session.store();
    let schema: FeatureSchema = store.load(&session.session, artifact::SCHEMA)?;
    let dataset: EncodedDataset = store.load(&session.session, artifact::DATASET)?;
    let model: MlpClassifier = store.load(&session.session, artifact::NETWORK)?;

    let tree = distill(&model, &dataset.x_train, &schema, params)?;
    println!(
        "✓ Tree distilled: {} nodes, depth {}",
        tree.node_count(),
        tree.depth()
    );

    let y_distilled = model.predict(&dataset.x_train);
    let y_distilled_tree = tree_labels(&tree, &dataset.x_train)?;
    let eval = evaluate_tree(&tree, &dataset.x_test, &dataset.y_test)?;
    println!("  Test accuracy: {:.4}", eval.accuracy);

    store.save(&session.session, artifact::TREE, &tree.to_serializable()?)?;
    store.save(&session.session, artifact::Y_DISTILLED, &y_distilled)?;
    store.save(&session.session, artifact::Y_DISTILLED_TREE, &y_distilled_tree)?;
    Ok(())
}

fn load_tree(store: &FsStore, session: &str) -> Result<SurrogateTree> {
    let serial: SerialTree = store.load(session, artifact::TREE)?;
    SurrogateTree::from_serializable(serial)
}

/// An edit is durable only once the round-trip back to the store succeeds.
fn save_tree(store: &FsStore, session: &str, tree: &SurrogateTree) -> Result<()> {
    store.save(session, artifact::TREE, &tree.to_serializable()?)
}

fn cmd_show(session: &SessionArgs) -> Result<()> {
    let store = session.store();
    let tree = load_tree(&store, &session.session)?;
    print!("{}", tree.render()?);
    Ok(())
}

fn cmd_cut(session: &SessionArgs, node_id: usize, direction: &str) -> Result<()> {
    let store = session.store();
    let mut tree = load_tree(&store, &session.session)?;
    tree.delete_branch(node_id, direction.parse::<PruneDirection>()?)?;
    save_tree(&store, &session.session, &tree)?;
    println!("✓ Branch cut at node {node_id}; {} nodes remain", tree.node_count());
    Ok(())
}

fn cmd_retrain(session: &SessionArgs, node_id: usize) -> Result<()> {
    let store = session.store();
    let dataset: EncodedDataset = store.load(&session.session, artifact::DATASET)?;
    let mut tree = load_tree(&store, &session.session)?;
    tree.delete_node(&dataset.x_train, &dataset.train_labels(), node_id)?;
    save_tree(&store, &session.session, &tree)?;
    println!(
        "✓ Subtree retrained at node {node_id}; {} nodes, depth {}",
        tree.node_count(),
        tree.depth()
    );
    Ok(())
}

fn cmd_modify(
    session: &SessionArgs,
    node_id: usize,
    threshold: Option<f64>,
    feature_index: Option<usize>,
) -> Result<()> {
    let store = session.store();
    let mut tree = load_tree(&store, &session.session)?;
    tree.modify_node(node_id, threshold, feature_index)?;
    save_tree(&store, &session.session, &tree)?;
    println!("✓ Node {node_id} modified");
    Ok(())
}

fn cmd_finetune(session: &SessionArgs, params: &FinetuneParams) -> Result<()> {
    let store = session.store();
    let schema: FeatureSchema = store.load(&session.session, artifact::SCHEMA)?;
    let dataset: EncodedDataset = store.load(&session.session, artifact::DATASET)?;
    let mut model: MlpClassifier = store.load(&session.session, artifact::NETWORK)?;
    let tree = load_tree(&store, &session.session)?;
    let y_distilled: Array2<f32> = store.load(&session.session, artifact::Y_DISTILLED)?;

    let y_tree = tree_labels(&tree, &dataset.x_train)?;
    let report = finetune(
        &mut model,
        &dataset.x_train,
        &dataset.y_train,
        &y_distilled,
        &y_tree,
        params,
    )?;
    println!(
        "✓ Fine-tuned ({}) {} epochs, final loss {:.6}",
        params.mode,
        report.epochs,
        report.final_loss().unwrap_or(0.0)
    );

    let eval = evaluate_model(&model, &dataset.x_test, &dataset.y_test, &schema.class_names)?;
    println!("  Test accuracy: {:.4}", eval.accuracy);

    store.save(&session.session, artifact::NETWORK, &model)?;
    Ok(())
}

fn cmd_eval(session: &SessionArgs, target: EvalTarget) -> Result<()> {
    let store = session.store();
    let schema: FeatureSchema = store.load(&session.session, artifact::SCHEMA)?;
    let dataset: EncodedDataset = store.load(&session.session, artifact::DATASET)?;

    let eval = match target {
        EvalTarget::Network => {
            let model: MlpClassifier = store.load(&session.session, artifact::NETWORK)?;
            evaluate_model(&model, &dataset.x_test, &dataset.y_test, &schema.class_names)?
        }
        EvalTarget::Tree => {
            let tree = load_tree(&store, &session.session)?;
            evaluate_tree(&tree, &dataset.x_test, &dataset.y_test)?
        }
    };
    print!("{eval}");
    store.save(&session.session, artifact::EVALUATION, &eval)?;
    Ok(())
}

fn cmd_run(session: &SessionArgs, spec_path: &Path) -> Result<()> {
    let spec = PipelineSpec::from_yaml(spec_path)?;
    println!("✓ Pipeline spec loaded and validated");

    cmd_encode(
        session,
        &spec.log,
        &spec.categorical_attrs,
        &spec.numerical_attrs,
        &spec.encode,
    )?;
    cmd_train(session, &spec.network, &spec.train)?;
    cmd_distill(session, &spec.tree)?;
    println!("✓ Pipeline complete");
    Ok(())
}
