use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use anyhow::{Context, Result};
use serde::Serialize;
use geoplot_tools::logging::init_logging;
use geoplot_tools::{batch_convert, count_csv_inputs, count_inputs, extract, list_containers, merge};

fn folder_arg(id: &'static str, long: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(long)
        .num_args(1)
        .required(true)
        .value_parser(clap::value_parser!(PathBuf))
        .help(help)
}

fn country_arg(default: &'static str) -> Arg {
    Arg::new("country")
        .short('c')
        .long("country")
        .num_args(1)
        .env("GEOPLOT_COUNTRY")
        .default_value(default)
        .help("ProducerCountry written into every feature")
}

fn cli() -> Command {
    Command::new("geoplot")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Merges, converts and recovers plot geometry as GeoJSON")
        .subcommand_required(true)
        .subcommand(
            Command::new("merge")
                .about("Merge every .geojson file under a folder into one deduplicated collection")
                .arg(folder_arg("input", "input", "Folder searched recursively for .geojson files"))
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .num_args(1)
                        .value_parser(clap::value_parser!(PathBuf))
                        .required_unless_present("preview")
                        .help("Output file; .geojson is appended if missing, existing files are never overwritten"),
                )
                .arg(country_arg("Unknown"))
                .arg(
                    Arg::new("bbox")
                        .long("bbox")
                        .action(ArgAction::SetTrue)
                        .help("Add a bbox covering every feature"),
                )
                .arg(
                    Arg::new("preview")
                        .long("preview")
                        .action(ArgAction::SetTrue)
                        .help("Only count the files that would be merged"),
                ),
        )
        .subcommand(
            Command::new("csv")
                .about("Convert every .csv in a folder into a GeoJSON file of plot polygons")
                .arg(folder_arg("input", "input", "Folder holding the .csv files"))
                .arg(
                    Arg::new("output")
                        .long("output")
                        .num_args(1)
                        .value_parser(clap::value_parser!(PathBuf))
                        .required_unless_present("preview")
                        .help("Folder the .geojson files are written to"),
                )
                .arg(country_arg("NZ"))
                .arg(
                    Arg::new("order-col")
                        .long("order-col")
                        .num_args(1)
                        .help("Column that orders the vertices of each polygon"),
                )
                .arg(
                    Arg::new("preview")
                        .long("preview")
                        .action(ArgAction::SetTrue)
                        .help("Only count the files that would be converted"),
                ),
        )
        .subcommand(
            Command::new("extract")
                .about("Recover GeoJSON payloads embedded in .xlsx and .zip containers")
                .arg(folder_arg("input", "input", "Folder holding the containers"))
                .arg(
                    Arg::new("output")
                        .long("output")
                        .num_args(1)
                        .value_parser(clap::value_parser!(PathBuf))
                        .required_unless_present("preview")
                        .help("Folder the recovered files are written to"),
                )
                .arg(
                    Arg::new("preview")
                        .long("preview")
                        .action(ArgAction::SetTrue)
                        .help("Only list the containers that would be processed"),
                ),
        )
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn path(matches: &ArgMatches, id: &str) -> Option<PathBuf> {
    matches.get_one::<PathBuf>(id).cloned()
}

fn run(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("merge", sub)) => {
            let input = path(sub, "input").context("missing --input")?;
            if sub.get_flag("preview") {
                let count = count_inputs(&input)?;
                println!("{} .geojson files found in {}", count, input.display());
                return Ok(());
            }
            let output = path(sub, "output").context("missing --output")?;
            let country = sub.get_one::<String>("country").map(String::as_str).unwrap_or("Unknown");
            let (final_path, summary) = merge(&input, &output, country, sub.get_flag("bbox"))?;
            println!("Merged into {}", final_path.display());
            print_json(&summary)
        }
        Some(("csv", sub)) => {
            let input = path(sub, "input").context("missing --input")?;
            if sub.get_flag("preview") {
                let count = count_csv_inputs(&input)?;
                println!("{} .csv files found in {}", count, input.display());
                return Ok(());
            }
            let output = path(sub, "output").context("missing --output")?;
            let country = sub.get_one::<String>("country").map(String::as_str).unwrap_or("NZ");
            let order_col = sub.get_one::<String>("order-col").map(String::as_str);
            let summary = batch_convert(&input, &output, country, order_col)?;
            print_json(&summary)
        }
        Some(("extract", sub)) => {
            let input = path(sub, "input").context("missing --input")?;
            if sub.get_flag("preview") {
                for container in list_containers(&input)? {
                    println!("{}", container.display());
                }
                return Ok(());
            }
            let output = path(sub, "output").context("missing --output")?;
            let summary = extract(&input, &output)?;
            print_json(&summary)
        }
        _ => unreachable!("subcommand_required is set"),
    }
}

fn main() {
    init_logging();
    let matches = cli().get_matches();

    if let Err(e) = run(&matches) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
