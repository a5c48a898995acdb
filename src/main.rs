use anyhow::Result;
use clap::Parser;
use dreamforge::{Config, GenerationRequest, ImageGenerator};
use serde_json::Value;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "dreamforge")]
#[command(about = "Generate an image from a text prompt")]
struct CliArgs {
    /// Text description of the image. Read from stdin when omitted.
    #[arg(value_name = "PROMPT")]
    prompt: Option<String>,

    /// Model identifier, `owner/name` or `owner/name:version`.
    #[arg(long)]
    model: Option<String>,

    /// Directory the image is written to.
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Extra model input; VALUE is parsed as JSON, falling back to a string.
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    params: Vec<(String, Value)>,
}

fn parse_param(input: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("Invalid parameter '{}'. Expected format: KEY=VALUE", input))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Invalid parameter '{}'. Key must not be empty", input));
    }
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn strip_line_ending(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line)
}

fn read_prompt() -> io::Result<String> {
    print!("Enter image prompt: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(strip_line_ending(&line).to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dreamforge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    // Configuration problems end the process before any network activity.
    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(model) = args.model {
        config = config.with_model(model);
    }
    if let Some(output_dir) = args.output_dir {
        config = config.with_output_dir(output_dir);
    }

    let generator = match ImageGenerator::new(&config) {
        Ok(generator) => generator,
        Err(e) => {
            error!("Failed to initialize image generator: {}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let prompt = match args.prompt {
        Some(prompt) => prompt,
        None => read_prompt()?,
    };

    let outcome = match GenerationRequest::new(&prompt) {
        Ok(request) => generator
            .generate(&request.with_params(args.params))
            .await,
        Err(e) => Err(e.into()),
    };

    match outcome {
        Ok(result) => {
            info!(
                "Generation completed in {} attempt(s)",
                result.attempts
            );
            println!("Image generated successfully!\nSaved to: {}", result.path.display());
            Ok(())
        }
        Err(e) => {
            error!("Generation failed: {}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
