//! Run one task of the DT extraction suite for a single cycle.

use anyhow::{Context, Error};
use clap::{Arg, ArgMatches, Command};
use dt_extract::{check_file_exists, CommonCmdLineArgs, ExtractDt, Extraction, RetrieveDt};
use tracing::{info, warn};

fn main() {
    if let Err(ref e) = run() {
        println!("error: {}", e);

        for cause in e.chain().skip(1) {
            println!("caused by: {}", cause);
        }

        ::std::process::exit(1);
    }
}

fn run() -> Result<(), Error> {
    let app = CommonCmdLineArgs::new_app("dtrun", "Run a DT extraction task for one cycle.")
        .subcommand_required(true)
        .subcommand(
            Command::new("retrieve")
                .about("Retrieve the GRIB data of the cycle into the DT directory."),
        )
        .subcommand(
            Command::new("extract")
                .about("Convert the retrieved GRIB files into point SQLite databases."),
        )
        .subcommand(
            Command::new("missing")
                .about("List forecast steps without a file, joined by '/'.")
                .arg(
                    Arg::new("steps")
                        .long("steps")
                        .value_name("STEPS")
                        .help("Steps to check, separated by '/'. Defaults to the forecast range."),
                )
                .arg(
                    Arg::new("path")
                        .long("path")
                        .value_name("DIR")
                        .default_value("")
                        .help("Directory holding the files."),
                )
                .arg(
                    Arg::new("prefix")
                        .long("prefix")
                        .value_name("PREFIX")
                        .required(true)
                        .help("File name up to the '+' in front of the step."),
                ),
        );

    let (common_args, matches) = CommonCmdLineArgs::matches(app)?;
    common_args.log().init();

    match matches.subcommand() {
        Some(("retrieve", _)) => retrieve(&common_args)?,
        Some(("extract", _)) => extract(&common_args)?,
        Some(("missing", sub_args)) => missing(&common_args, sub_args)?,
        _ => unreachable!(),
    }

    Ok(())
}

fn retrieve(common_args: &CommonCmdLineArgs) -> Result<(), Error> {
    let task = RetrieveDt::new(common_args.config())?;
    task.execute().context("retrieval failed")?;

    info!("retrieved data into {}", task.dt_path().display());
    Ok(())
}

fn extract(common_args: &CommonCmdLineArgs) -> Result<(), Error> {
    let task = ExtractDt::new(common_args.config(), common_args.log())?;

    match task.execute().context("extraction failed")? {
        Extraction::SkippedRetriesExhausted => info!("nothing extracted"),
        Extraction::Done { converted, missing } => {
            info!("extracted {} files", converted);
            if !missing.is_empty() {
                warn!("{} files were missing", missing.len());
            }
        }
    }

    Ok(())
}

fn missing(common_args: &CommonCmdLineArgs, sub_args: &ArgMatches) -> Result<(), Error> {
    let steps: Vec<String> = match sub_args.get_one::<String>("steps") {
        Some(steps) => steps.split('/').map(str::to_owned).collect(),
        None => common_args.config().steps()?,
    };

    let path = sub_args
        .get_one::<String>("path")
        .map(String::as_str)
        .unwrap_or("");
    let prefix = sub_args
        .get_one::<String>("prefix")
        .map(String::as_str)
        .unwrap_or("");

    println!("{}", check_file_exists(&steps, path, prefix));
    Ok(())
}
