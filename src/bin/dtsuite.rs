//! Generate the DT extraction ecFlow suite and load it into the server.

use std::path::PathBuf;

use anyhow::{Context, Error};
use clap::{Arg, ArgAction};
use dt_extract::{CommonCmdLineArgs, DtExtractSuite};
use tracing::info;

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
    let app = CommonCmdLineArgs::new_app(
        "dtsuite",
        "Generate the ecFlow suite that retrieves and extracts DT data once per day.",
    )
    .arg(
        Arg::new("output")
            .short('o')
            .long("output")
            .value_name("FILE")
            .help("Where to write the suite definition.")
            .long_help("Where to write the suite definition. Defaults to ECF_FILES/<case>.def"),
    )
    .arg(
        Arg::new("dry-run")
            .long("dry-run")
            .action(ArgAction::SetTrue)
            .help("Write the files but do not contact the ecFlow server."),
    )
    .arg(
        Arg::new("replace")
            .long("replace")
            .action(ArgAction::SetTrue)
            .help("Replace a suite of the same name that is already loaded."),
    );

    let (common_args, matches) = CommonCmdLineArgs::matches(app)?;
    common_args.log().init();

    let config = common_args.config();
    let config_path = common_args
        .config_path()
        .canonicalize()
        .with_context(|| format!("cannot resolve {}", common_args.config_path().display()))?;

    let suite = DtExtractSuite::new(config, &config_path)?;

    let def_file = matches
        .get_one::<String>("output")
        .map(PathBuf::from)
        .unwrap_or_else(|| suite.default_def_file());

    suite
        .write(&def_file)
        .context("unable to write the suite files")?;

    if matches.get_flag("dry-run") {
        info!("dry run, not loading {}", def_file.display());
        return Ok(());
    }

    suite
        .load(&def_file, matches.get_flag("replace"))
        .context("unable to load the suite into ecFlow")?;

    info!("suite {} loaded and started", suite.definition().name());
    Ok(())
}
