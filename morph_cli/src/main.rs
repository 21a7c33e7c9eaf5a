use clap::{Parser, Subcommand};
use morph_cli::cmds;
use morph_cli::cmds::common::{parse_casing, parse_policy, Overrides};
use morph_cli::cmds::convert::InputForm;
use morph_codec::{KeyCasing, UnknownKeyPolicy};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "morph")]
#[command(about = "Record codec toolchain - schema checking, decoding, normalization and inference")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct ConvertArgs {
    /// Schema document (YAML, or JSON by extension)
    #[arg(short = 's', long = "schema", value_name = "FILE")]
    schema: PathBuf,

    /// Record type to decode as
    #[arg(short = 't', long = "type-name")]
    type_name: String,

    /// Input document to convert
    #[arg(short = 'd', long = "data-file", value_name = "FILE")]
    data_file: PathBuf,

    /// Read the input as KEY=VALUE lines instead of a document
    #[arg(long = "flat")]
    flat: bool,

    /// Key casing expected in the input (camel, snake, kebab, ...)
    #[arg(long = "decode-casing", value_parser = parse_casing)]
    decode_casing: Option<KeyCasing>,

    /// Key casing written in the output
    #[arg(long = "encode-casing", value_parser = parse_casing)]
    encode_casing: Option<KeyCasing>,

    /// Unknown input keys: ignore, warn or raise
    #[arg(long = "unknown-keys", value_parser = parse_policy)]
    unknown_keys: Option<UnknownKeyPolicy>,

    /// Leave out fields equal to their default
    #[arg(long = "omit-default")]
    omit_default: bool,

    /// Pretty print JSON output
    #[arg(short = 'p', long = "pretty")]
    pretty: bool,
}

impl ConvertArgs {
    fn form(&self) -> InputForm {
        if self.flat {
            InputForm::Flat
        } else {
            InputForm::Document
        }
    }

    fn overrides(&self) -> Overrides {
        Overrides {
            decode_casing: self.decode_casing,
            encode_casing: self.encode_casing,
            unknown_keys: self.unknown_keys,
            omit_default: self.omit_default,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every record of a schema document in both directions
    Check {
        /// Schema document (YAML, or JSON by extension)
        #[arg(short = 's', long = "schema", value_name = "FILE")]
        schema: PathBuf,
    },

    /// Decode an input document and print the record with its field names
    Decode(ConvertArgs),

    /// Decode an input document and encode it back in canonical form
    Normalize(ConvertArgs),

    /// Draft a schema document from a sample input
    Infer {
        /// Sample document
        #[arg(short = 'd', long = "data-file", value_name = "FILE")]
        data_file: PathBuf,

        /// Name of the root record
        #[arg(short = 'n', long = "name", default_value = "Root")]
        name: String,

        /// Print the schema as JSON instead of YAML
        #[arg(long = "json")]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { schema } => {
            cmds::check::run(&schema)?;
        }

        Commands::Decode(args) => {
            cmds::convert::run_decode(
                &args.schema,
                &args.type_name,
                &args.data_file,
                args.form(),
                &args.overrides(),
                args.pretty,
            )?;
        }

        Commands::Normalize(args) => {
            cmds::convert::run_normalize(
                &args.schema,
                &args.type_name,
                &args.data_file,
                args.form(),
                &args.overrides(),
                args.pretty,
            )?;
        }

        Commands::Infer {
            data_file,
            name,
            json,
        } => {
            cmds::infer::run(&data_file, &name, json)?;
        }
    }

    Ok(())
}
