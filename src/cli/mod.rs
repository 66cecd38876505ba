//! CLI mode for course-dl: argument parsing, run setup and the final report.

mod progress;

use std::path::PathBuf;
use std::sync::Arc;

use crate::credentials::{ENV_PASSWORD, ENV_USERNAME, ENV_WAIT, LOGIN_INFO_TEMPLATE};
use crate::webdriver::WebDriverSession;
use crate::{AppConfig, Error, Harvester, LoginInfo, TokioFileSystem};

use progress::{SpinnerProgress, print_diagnostics, print_summary};

/// Options given on the command line; each overrides the configuration file.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CliOptions {
    pub config: Option<PathBuf>,
    pub login_info: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub webdriver: Option<String>,
    pub headless: bool,
    pub remove_strays: bool,
}

/// What the command line asked for.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Run(CliOptions),
    Help,
}

/// Parses arguments (without the program name).
///
/// # Errors
///
/// Returns a message for unknown options or options missing their value.
pub fn parse_args<I>(args: I) -> Result<Command, String>
where
    I: IntoIterator<Item = String>,
{
    let mut options = CliOptions::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => options.config = Some(value(&arg, args.next())?.into()),
            "-l" | "--login-info" => options.login_info = Some(value(&arg, args.next())?.into()),
            "-o" | "--output" => options.output = Some(value(&arg, args.next())?.into()),
            "-w" | "--webdriver" => options.webdriver = Some(value(&arg, args.next())?),
            "--headless" => options.headless = true,
            "--remove-strays" => options.remove_strays = true,
            "-h" | "--help" => return Ok(Command::Help),
            _ => return Err(format!("Unknown option: {arg}")),
        }
    }
    Ok(Command::Run(options))
}

fn value(flag: &str, next: Option<String>) -> Result<String, String> {
    next.ok_or_else(|| format!("{flag} requires a value"))
}

pub fn print_usage() {
    eprintln!("Usage: course-dl [OPTIONS]");
    eprintln!();
    eprintln!("Downloads every document of every course on the portal into");
    eprintln!("<output>/bb_download_<username>/<course>/<folder>/.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <FILE>      Configuration file (default: <config dir>/course-dl/config.toml)");
    eprintln!("  -l, --login-info <FILE>  Login info file (default: login_info.txt)");
    eprintln!("  -o, --output <DIR>       Browser download directory (default: your Downloads folder)");
    eprintln!("  -w, --webdriver <URL>    WebDriver server (default: http://localhost:4444)");
    eprintln!("      --headless           Run the browser without a window");
    eprintln!("      --remove-strays      Delete downloads that could not be sorted into a folder");
    eprintln!("  -h, --help               Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  {ENV_USERNAME:<20} Portal username (with the two below, replaces the login info file)");
    eprintln!("  {ENV_PASSWORD:<20} Portal password");
    eprintln!("  {ENV_WAIT:<20} Seconds to wait for pages to settle, 1-5");
    eprintln!("  RUST_LOG             Log filter (default: info)");
}

/// Prints a fatal error, followed by what to fix in the input when the
/// problem was with the login info.
pub fn report_error(error: &Error) {
    eprintln!("{} {error}", console::style("Error:").red().bold());
    if let Some(hint) = input_hint(error) {
        eprintln!();
        eprintln!("{hint}");
    }
}

fn input_hint(error: &Error) -> Option<String> {
    let format = LOGIN_INFO_TEMPLATE
        .lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n");
    match error {
        Error::Precondition(_) => Some(format!(
            "The login info file must contain exactly three lines:\n{format}\n\
             where the last line is a wait time in seconds from 1 to 5."
        )),
        Error::AuthFailed(_) => Some(format!(
            "Check your username and password. The login info file is reset after\n\
             it is read, so enter them again before every run:\n{format}"
        )),
        _ => None,
    }
}

fn apply(options: &CliOptions, config: &mut AppConfig) {
    if let Some(path) = &options.login_info {
        config.paths.login_info.clone_from(path);
    }
    if let Some(dir) = &options.output {
        config.paths.output_root.clone_from(dir);
    }
    if let Some(url) = &options.webdriver {
        config.browser.webdriver_url.clone_from(url);
    }
    config.browser.headless |= options.headless;
    config.harvest.remove_stray_downloads |= options.remove_strays;
}

fn load_login_info(config: &AppConfig) -> crate::Result<LoginInfo> {
    if let Some(info) = LoginInfo::from_env()? {
        log::info!("Using login info from the environment");
        return Ok(info);
    }
    LoginInfo::from_file(&config.paths.login_info, config.harvest.scrub_login_info)
}

/// Runs the CLI with the process arguments.
///
/// # Errors
///
/// Returns an error for invalid input, an unreachable browser or a failed
/// login. Problems during the walk itself are reported, not returned.
pub async fn run() -> crate::Result<()> {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(Command::Run(options)) => options,
        Ok(Command::Help) => {
            print_usage();
            return Ok(());
        }
        Err(message) => {
            print_usage();
            return Err(Error::Precondition(message));
        }
    };

    let mut config = AppConfig::load(options.config.as_deref())?;
    apply(&options, &mut config);

    let info = load_login_info(&config)?;
    config.harvest = config.harvest.with_settle_wait(info.settle_wait());

    let output_root = config.paths.output_root.clone();
    if !output_root.is_dir() {
        return Err(Error::Precondition(format!(
            "output directory {} does not exist",
            output_root.display()
        )));
    }

    println!("Logging in as {}...", info.username);
    let session = WebDriverSession::connect(&config.browser, &output_root).await?;
    let progress = Arc::new(SpinnerProgress::new());
    let harvester = Harvester::new(session, TokioFileSystem::new(), config)
        .with_progress(Arc::clone(&progress) as Arc<dyn crate::HarvestProgress>);

    let result = harvester.run(&info).await;
    progress.finish();
    if let Err(e) = harvester.close().await {
        log::error!("Could not close the browser session: {e}");
    }

    let report = result?;
    print_summary(&report);
    print_diagnostics(&report.diagnostics);
    Ok(())
}
