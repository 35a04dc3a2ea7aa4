// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    anyhow::{anyhow, Context, Result},
    clap::{value_parser, Arg, ArgAction, ArgMatches, Command},
    esr_modification::{apply, ExecutionContext, Manifest},
    esr_packager::{
        config::PackagerConfig,
        error::{EXIT_OPERATION_FAILURES, EXIT_SUCCESS},
        pipeline::Pipeline,
    },
    log::{error, warn, LevelFilter},
    std::path::{Path, PathBuf},
};

const ESR_PACKAGER_VERSION: &str = env!("CARGO_PKG_VERSION");

const PACKAGE_ABOUT: &str = "\
Build a customized Firefox ESR installer package.

The installer is downloaded (or taken from --setup), extracted, and modified
according to the configured manifest. The result is copied to a new directory
under the output root named after the product version and today's date. If a
publish root is configured the package is then copied to it, and if a
deployment section is configured the package is registered as an application.

Exit status is 0 on success, 2 when some modifications failed, 1 when the run
stopped before modifying anything, 3 when a later stage failed and 4 when
only the deployment registration failed.
";

const APPLY_MANIFEST_ABOUT: &str = "\
Apply a modifications manifest to an already extracted installer tree.

The tree is modified in place. The product version substituted for the
#Version# placeholder is read from core/firefox.exe in the tree unless
--product-version is given.
";

fn init_logging(verbosity: u8) {
    let log_level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    if log_level == LevelFilter::Info {
        builder.filter_module("rustls", LevelFilter::Error);
    }

    builder.init();
}

fn path_arg(name: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .action(ArgAction::Set)
        .value_parser(value_parser!(PathBuf))
}

pub fn run() -> Result<i32> {
    let app = Command::new("esr-packager")
        .version(ESR_PACKAGER_VERSION)
        .about("Build silently deployable Firefox ESR packages")
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("Increase logging verbosity. Can be specified multiple times"),
        );

    let app = app.subcommand(
        Command::new("package")
            .about("Run the full packaging pipeline")
            .long_about(PACKAGE_ABOUT)
            .arg(
                path_arg("config")
                    .required(true)
                    .value_name("FILE")
                    .help("YAML file defining the packaging configuration"),
            )
            .arg(
                path_arg("setup")
                    .value_name("FILE")
                    .help("Local installer to use instead of downloading one"),
            )
            .arg(
                path_arg("manifest")
                    .value_name("FILE")
                    .help("Modifications manifest overriding the configured one"),
            )
            .arg(
                path_arg("output-root")
                    .value_name("DIR")
                    .help("Output root overriding the configured one"),
            ),
    );

    let app = app.subcommand(
        Command::new("apply-manifest")
            .about("Apply a modifications manifest to an extracted installer tree")
            .long_about(APPLY_MANIFEST_ABOUT)
            .arg(
                path_arg("manifest")
                    .required(true)
                    .value_name("FILE")
                    .help("Modifications manifest to apply"),
            )
            .arg(
                path_arg("tree")
                    .required(true)
                    .value_name("DIR")
                    .help("Root of the extracted installer tree"),
            )
            .arg(
                Arg::new("product-version")
                    .long("product-version")
                    .action(ArgAction::Set)
                    .value_name("VERSION")
                    .help("Version substituted for the #Version# placeholder"),
            ),
    );

    let app = app.subcommand(
        Command::new("print-version")
            .about("Print the version metadata of a Windows binary")
            .arg(
                Arg::new("path")
                    .required(true)
                    .value_name("FILE")
                    .value_parser(value_parser!(PathBuf))
                    .help("Binary to inspect"),
            ),
    );

    let matches = app.get_matches();

    init_logging(matches.get_count("verbose"));

    match matches.subcommand() {
        Some(("package", args)) => command_package(args),
        Some(("apply-manifest", args)) => command_apply_manifest(args),
        Some(("print-version", args)) => command_print_version(args),
        Some((command, _)) => Err(anyhow!("invalid sub-command: {}", command)),
        None => Err(anyhow!("no sub-command given")),
    }
}

fn required_path<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a Path> {
    args.get_one::<PathBuf>(name)
        .map(PathBuf::as_path)
        .ok_or_else(|| anyhow!("--{} is required", name))
}

fn command_package(args: &ArgMatches) -> Result<i32> {
    let config_path = required_path(args, "config")?;

    let mut config = PackagerConfig::from_path(config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    if let Some(manifest) = args.get_one::<PathBuf>("manifest") {
        config.manifest = Some(manifest.clone());
    }
    if let Some(root) = args.get_one::<PathBuf>("output-root") {
        config.output_root = Some(root.clone());
    }

    let pipeline = Pipeline::new(config).context("validating config")?;

    match pipeline.run(args.get_one::<PathBuf>("setup").map(PathBuf::as_path)) {
        Ok(report) => {
            report.log_summary();
            Ok(report.exit_code())
        }
        Err(e) => {
            error!("{} stage failed: {}", e.stage(), e);
            if e.aborted_before_modifications() {
                error!("no modifications were made");
            }
            Ok(e.exit_code())
        }
    }
}

fn command_apply_manifest(args: &ArgMatches) -> Result<i32> {
    let manifest_path = required_path(args, "manifest")?;
    let tree = required_path(args, "tree")?;

    let manifest = Manifest::from_path(manifest_path)
        .with_context(|| format!("loading manifest {}", manifest_path.display()))?;

    let product_version = match args.get_one::<String>("product-version") {
        Some(version) => version.clone(),
        None => {
            let binary = tree.join(PackagerConfig::default().version_binary);
            esr_version::probe(&binary)
                .with_context(|| format!("probing version of {}", binary.display()))?
                .product_version
        }
    };
    warn!("product version {}", product_version);

    let manifest_dir = manifest_path.parent().unwrap_or_else(|| Path::new(""));
    let report = apply(
        &manifest,
        &ExecutionContext::new(tree, manifest_dir, product_version),
    );
    report.log_summary();

    Ok(if report.is_success() {
        EXIT_SUCCESS
    } else {
        EXIT_OPERATION_FAILURES
    })
}

fn command_print_version(args: &ArgMatches) -> Result<i32> {
    let path = required_path(args, "path")?;

    let info = esr_version::probe(path)?;

    println!("file version: {}", info.file_version);
    println!("product version: {}", info.product_version);

    Ok(EXIT_SUCCESS)
}
