use clap::{App, Arg};
use folio::build::{build_site, BuildReport};
use folio::config::{self, Config};
use folio::write::Writer;
use std::path::PathBuf;

fn main() {
    env_logger::init();
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
    }
}

/// Builds the project and returns whether every document succeeded.
fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let matches = App::new("folio")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Renders front-matter Markdown posts into page records")
        .arg(
            Arg::with_name("project")
                .help("The project directory (searched upward for folio.yaml)")
                .index(1),
        )
        .arg(
            Arg::with_name("threads")
                .short("j")
                .long("threads")
                .takes_value(true)
                .help("The number of worker threads"),
        )
        .arg(
            Arg::with_name("fail-fast")
                .long("fail-fast")
                .help("Stop after the first failed document"),
        )
        .get_matches();

    let dir = PathBuf::from(matches.value_of("project").unwrap_or("."));
    let mut config = match Config::from_directory(&dir) {
        Ok(config) => config,
        Err(config::Error::NotFound(_)) => {
            log::warn!(
                "no `{}` found; using the default configuration",
                config::PROJECT_FILE
            );
            Config::default().anchored(&dir)
        }
        Err(e) => return Err(e.into()),
    };
    if let Some(threads) = matches.value_of("threads") {
        config.threads = Some(threads.parse()?);
    }
    if matches.is_present("fail-fast") {
        config.fail_fast = true;
    }

    let report = build_site(&config)?;
    Writer {
        output_directory: &config.output_directory,
    }
    .write_report(&report)?;
    print_report(&report);
    Ok(report.is_success())
}

fn print_report(report: &BuildReport) {
    for page in &report.pages {
        println!("ok    {}", page.id);
    }
    for failure in &report.failures {
        println!("FAIL  {}", failure);
    }
    for path in &report.skipped {
        println!("skip  {}", path.display());
    }
    println!(
        "{} built, {} failed, {} skipped",
        report.pages.len(),
        report.failures.len(),
        report.skipped.len()
    );
}
