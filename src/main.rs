use clap::{Parser as ClapParser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use gml_compiler::analysis::SymbolScan;
use gml_compiler::config::Config;
use gml_compiler::{assembler, lexer};
use gml_compiler::{compile_batch_to_bytecode, CompileUnit, CompilerError, ResolutionContext};

#[derive(ClapParser)]
#[command(author, version, about = "GameMaker Language Compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile .gml files into bytecode
    Compile {
        /// Source files to compile
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Resolution context (JSON)
        #[arg(long)]
        context: Option<PathBuf>,
        /// Override the context's language version tier
        #[arg(long)]
        tier: Option<u32>,
        /// Output directory for the .bin files
        #[arg(long)]
        out: Option<PathBuf>,
        /// Print the instruction listing of each file
        #[arg(long)]
        listing: bool,
    },
    /// Print the token stream of a file
    Tokens {
        file: PathBuf,
        #[arg(long, default_value_t = 2)]
        tier: u32,
    },
    /// Harvest scripts, objects and enums from a project directory
    Scan {
        dir: PathBuf,
        /// Context to extend
        #[arg(long)]
        context: Option<PathBuf>,
        /// Where to write the extended context
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Manage gmlc configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the current configuration
    Show,
    /// Write the default configuration file
    Init,
    /// Print the configuration file location
    Path,
}

fn load_context(path: Option<&Path>, config: &Config) -> Result<ResolutionContext, CompilerError> {
    match path.or(config.context_path.as_deref()) {
        Some(path) => ResolutionContext::load(path),
        None => {
            if config.debug {
                println!("No resolution context given, using an empty one");
            }
            Ok(ResolutionContext::default())
        }
    }
}

fn read_units(files: &[PathBuf]) -> Result<Vec<CompileUnit>, CompilerError> {
    files
        .iter()
        .map(|path| {
            if !path.is_file() {
                return Err(CompilerError::FileNotFound(format!(
                    "Source file not found: {}",
                    path.display()
                )));
            }
            let source = fs::read_to_string(path)?;
            Ok(CompileUnit::new(path.display().to_string(), source))
        })
        .collect()
}

fn compile_files(
    files: &[PathBuf],
    context: &ResolutionContext,
    out_dir: &Path,
    listing: bool,
) -> Result<usize, CompilerError> {
    let units = read_units(files)?;
    let results = compile_batch_to_bytecode(&units, context);
    fs::create_dir_all(out_dir)?;

    let mut failures = 0;
    for ((path, unit), result) in files.iter().zip(&units).zip(results) {
        let assembled = result.and_then(|bytecode| {
            if listing {
                println!("== {} ==\n{}", unit.name, bytecode);
            }
            assembler::assemble(&bytecode, &context.encoding)
        });
        let assembly = match assembled {
            Ok(assembly) => assembly,
            Err(diagnostic) => {
                failures += 1;
                eprint!(
                    "{}",
                    CompilerError::Compile {
                        path: path.clone(),
                        diagnostic,
                    }
                );
                continue;
            }
        };

        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("out");
        let binary = out_dir.join(format!("{}.bin", stem));
        fs::write(&binary, &assembly.code)?;
        fs::write(
            out_dir.join(format!("{}.json", stem)),
            serde_json::to_string_pretty(&assembly)?,
        )?;
        println!(
            "Compiled {} -> {} ({} bytes)",
            unit.name,
            binary.display(),
            assembly.code.len()
        );
    }

    Ok(failures)
}

fn print_tokens(file: &Path, tier: u32) -> Result<(), CompilerError> {
    let source = fs::read_to_string(file)?;
    let tokens = lexer::tokenize(&source, tier).map_err(|diagnostic| CompilerError::Compile {
        path: file.to_path_buf(),
        diagnostic,
    })?;
    for token in tokens {
        println!("{}\t{:?}\t{}", token.position, token.kind, token.value);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let first_run = !Config::get_config_path().exists();
    let config = Config::load()?;

    match cli.command {
        Commands::Compile {
            files,
            context,
            tier,
            out,
            listing,
        } => {
            let mut context = load_context(context.as_deref(), &config)?;
            if let Some(tier) = tier {
                context.version_tier = tier;
            }
            let out_dir = out.unwrap_or_else(|| config.output_dir.clone());
            if config.debug {
                println!(
                    "Compiling {} file(s) at tier {} into {}",
                    files.len(),
                    context.version_tier,
                    out_dir.display()
                );
            }

            let failures = compile_files(&files, &context, &out_dir, listing || config.debug)?;
            if failures > 0 {
                eprintln!("{} of {} file(s) failed to compile", failures, files.len());
                process::exit(1);
            }
        }
        Commands::Tokens { file, tier } => {
            print_tokens(&file, tier)?;
        }
        Commands::Scan { dir, context, out } => {
            let mut context = load_context(context.as_deref(), &config)?;
            let mut scan = SymbolScan::new();
            scan.scan_directory(&dir)?;
            scan.apply(&mut context);
            scan.print_analysis(&context);

            if let Some(out) = out {
                context.save(&out)?;
                println!("\nWrote resolution context to {}", out.display());
            }
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                println!("Environment: {}", config.env_name);
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigCommands::Init => {
                let path = Config::get_config_path();
                if first_run {
                    println!("Initialized new config file at: {}", path.display());
                } else {
                    println!("Config file already exists at: {}", path.display());
                    println!("Remove it to reinitialize with defaults.");
                }
            }
            ConfigCommands::Path => {
                println!("{}", Config::get_config_path().display());
            }
        },
    }

    Ok(())
}
