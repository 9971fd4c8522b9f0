use clap::Parser;
use serde_json::json;
use std::io::{self, BufWriter, Write};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tabixr::{Config, Error, Region, TabixReader};

fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    match run(&config) {
        Err(err) if config.json => {
            let report = match err.downcast_ref::<Error>() {
                Some(err) => err.to_json(),
                None => json!({ "error": "InternalError", "message": err.to_string() }),
            };
            println!("{}", report);
            std::process::exit(1);
        }
        result => result,
    }
}

fn run(config: &Config) -> anyhow::Result<()> {
    let reader = TabixReader::open_with(&config.path, config.options())?;
    tracing::debug!("reference sequences: {:?}", reader.descriptor().reference_names());

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if config.print_header {
        out.write_all(reader.header())?;
    }

    // One pass over the whole file when no region is given
    let regions: Vec<Option<&Region>> = if config.regions.is_empty() {
        vec![None]
    } else {
        config.regions.iter().map(Some).collect()
    };

    for region in regions {
        if config.json {
            for record in reader.query(region)? {
                let record = record?;
                let fields: Vec<String> = record
                    .fields()
                    .iter()
                    .map(|field| String::from_utf8_lossy(field).into_owned())
                    .collect();
                let value = json!({
                    "chrom": record.chrom(),
                    "start": record.start(),
                    "end": record.end(),
                    "fields": fields,
                });
                serde_json::to_writer(&mut out, &value)?;
                out.write_all(b"\n")?;
            }
        } else {
            for line in reader.fetch(region, false)? {
                out.write_all(&line?)?;
                out.write_all(b"\n")?;
            }
        }
    }

    out.flush()?;
    reader.close()?;

    Ok(())
}
