// Learn module - process entry point for training and evaluation runs
use std::path::Path;

use crate::cli::{Cli, Commands};
use crate::env::{self, Environment};
use crate::error::{RelabelError, Result};
use crate::logging::{init_logging, level_for};
use crate::rng::{PrngKey, SuppliedRng};
use crate::trainers::checkpoint::CheckpointManager;
use crate::trainers::evaluation::evaluate;
use crate::trainers::reward_model::{load_reward_model, RewardModel};
use crate::trainers::sac::SacAgent;
use crate::trainers::settings::RunOptions;
use crate::trainers::stats::{ConsoleWriter, Metrics, StatsReporter};
use crate::trainers::tensorboard::CsvWriter;
use crate::trainers::trainer_controller::{TrainerController, EVALUATION_NAMESPACE};
use crate::utils::directory_utils::{create_directory_if_not_exists, validate_existing_directories};

pub const CONFIGURATION_FILE_NAME: &str = "configuration.yaml";
pub const TRAINING_STATUS_FILE_NAME: &str = "training_status.json";
const LOG_FILE_NAME: &str = "train.log";
const SCALARS_DIR_NAME: &str = "tensorboard";
const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn get_version_string() -> String {
    format!(
        "Version information:\n  \
        sac-reward-model: {},\n  \
        CUDA available: {}",
        VERSION,
        tch::Cuda::is_available()
    )
}

/// Summary of a finished training run.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub steps: u64,
    pub updates: u64,
    pub episodes: u64,
}

fn agent_for(options: &RunOptions, env: &dyn Environment, device: tch::Device) -> Result<SacAgent> {
    SacAgent::create(
        options.env_settings.seed,
        env.observation_space().dim() as i64,
        env.action_space().dim() as i64,
        options.training.max_steps,
        options.sac.clone(),
        device,
    )
}

fn reward_model_for(options: &RunOptions, device: tch::Device) -> Result<RewardModel> {
    let settings = &options.reward_model;
    let kind = settings.kind()?;
    let path = settings.ckpt.as_ref().ok_or_else(|| {
        RelabelError::ModelLoad(
            "no reward model checkpoint configured (set reward_model.ckpt or --ckpt)".to_string(),
        )
    })?;
    load_reward_model(kind, path, device, settings.columns())
}

/// Loads the configured reward model, then trains with it.
pub fn run_training(options: &RunOptions) -> Result<TrainingOutcome> {
    options.validate()?;
    let device = options.torch_settings.resolve()?;
    let reward_model = reward_model_for(options, device)?;
    train_with_reward_model(options, reward_model)
}

/// Trains with an already constructed reward model.
pub fn train_with_reward_model(
    options: &RunOptions,
    reward_model: RewardModel,
) -> Result<TrainingOutcome> {
    options.validate()?;
    let device = options.torch_settings.resolve()?;
    log::info!("Using device {:?}", device);

    let run_dir = options.checkpoint_settings.run_dir();
    create_directory_if_not_exists(&run_dir)?;
    write_run_options(&run_dir, options)?;

    let env_settings = &options.env_settings;
    let env = env::make(
        &env_settings.env_name,
        env_settings.max_episode_steps,
        env_settings.seed,
    )?;
    let eval_env = env::make(
        &env_settings.env_name,
        env_settings.max_episode_steps,
        env_settings.seed.wrapping_add(1),
    )?;

    let mut reporter = StatsReporter::new();
    reporter.add_writer(Box::new(ConsoleWriter));
    let csv = CsvWriter::new(&run_dir, SCALARS_DIR_NAME)?;
    csv.log_hyperparams(&options.as_dict()?)?;
    reporter.add_writer(Box::new(csv));

    let checkpoints = if options.training.save_interval > 0 {
        Some(CheckpointManager::new(
            &options.checkpoint_settings.checkpoint_dir(),
            options.checkpoint_settings.keep_checkpoints,
        )?)
    } else {
        None
    };

    let agent = agent_for(options, env.as_ref(), device)?;
    let mut controller = TrainerController::new(
        options.training.clone(),
        env,
        eval_env,
        Some(reward_model),
        reporter,
        checkpoints,
        env_settings.seed,
    )?;
    controller.start_learning(agent)?;

    let outcome = TrainingOutcome {
        steps: options.training.max_steps,
        updates: controller.update_count(),
        episodes: controller.episodes(),
    };
    write_training_status(&run_dir, &outcome)?;

    log::info!("Training completed successfully!");
    Ok(outcome)
}

/// Restores the newest checkpoint and evaluates it with the temperature-0 policy.
pub fn run_evaluation(options: &RunOptions, episodes: Option<usize>) -> Result<Metrics> {
    options.validate()?;
    let device = options.torch_settings.resolve()?;
    let env_settings = &options.env_settings;
    let mut eval_env = env::make(
        &env_settings.env_name,
        env_settings.max_episode_steps,
        env_settings.seed.wrapping_add(1),
    )?;

    let checkpoint_dir = options.checkpoint_settings.checkpoint_dir();
    let manager = CheckpointManager::new(&checkpoint_dir, 0)?;
    let mut agent = agent_for(options, eval_env.as_ref(), device)?;
    let step = manager.restore_latest(&mut agent)?.ok_or_else(|| {
        RelabelError::Configuration(format!(
            "no checkpoint_<step> directories in {}",
            checkpoint_dir.display()
        ))
    })?;

    let episodes = episodes.unwrap_or(options.training.eval_episodes);
    let (_, eval_key) = PrngKey::new(env_settings.seed).split();
    let mut rng = SuppliedRng::new(eval_key);
    let metrics = evaluate(&agent, &mut eval_env, episodes, &mut rng)?;

    let mut reporter = StatsReporter::new();
    reporter.add_writer(Box::new(ConsoleWriter));
    reporter.write_stats(EVALUATION_NAMESPACE, &metrics, step)?;
    Ok(metrics)
}

fn write_run_options(output_dir: &Path, run_options: &RunOptions) -> Result<()> {
    let config_path = output_dir.join(CONFIGURATION_FILE_NAME);
    let yaml_str = serde_yaml::to_string(run_options)?;
    std::fs::write(config_path, yaml_str)?;
    Ok(())
}

fn write_training_status(output_dir: &Path, outcome: &TrainingOutcome) -> Result<()> {
    let status_path = output_dir.join(TRAINING_STATUS_FILE_NAME);
    let status = serde_json::json!({
        "completed": true,
        "steps": outcome.steps,
        "updates": outcome.updates,
        "episodes": outcome.episodes,
        "version": VERSION,
        "timestamp": chrono::Utc::now().to_rfc3339()
    });
    std::fs::write(status_path, serde_json::to_string_pretty(&status)?)?;
    Ok(())
}

/// Dispatches a parsed command line. Logging is installed here, once the
/// run directory is known.
pub fn run_cli(cli: &Cli) -> Result<()> {
    match cli.command() {
        Commands::Version => {
            println!("{}", get_version_string());
            Ok(())
        }
        Commands::Train => {
            let options = cli.run_options()?;
            let run_dir = options.checkpoint_settings.run_dir();
            validate_existing_directories(&run_dir, options.checkpoint_settings.force)?;
            init_logging(level_for(options.debug), Some(&run_dir.join(LOG_FILE_NAME)))?;

            log::info!("{}", get_version_string());
            log::debug!("Configuration: {}", serde_json::to_string_pretty(&options.as_dict()?)?);
            log::info!(
                "Run {} (seed {}) on {}",
                options.checkpoint_settings.run_id,
                options.env_settings.seed,
                options.env_settings.env_name
            );
            run_training(&options).map(|_| ())
        }
        Commands::Evaluate { episodes } => {
            let options = cli.run_options()?;
            init_logging(level_for(options.debug), None)?;
            run_evaluation(&options, episodes).map(|_| ())
        }
    }
}
