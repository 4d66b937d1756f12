use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "page-mirror",
    version,
    about = "Mirror a single web page and its assets into a local folder",
    long_about = "Downloads a page, every image, script, stylesheet, video and font it references, \
                  rewrites the references to the local copies and derives a PHP landing-page template."
)]
pub struct Cli {
    /// Also write the log to this file
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Only print warnings, errors and the final summary
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download a page with its assets and build the template
    Mirror(MirrorArgs),
    /// Rebuild content.php inside an existing run folder
    Template(TemplateArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct MirrorArgs {
    /// Page to mirror (http or https)
    pub url: String,

    /// Product name; names the run folder and is replaced in the template
    #[arg(short, long)]
    pub product: String,

    /// Folder that receives the run folder [default: ./output]
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Download at most one asset per kind
    #[arg(long)]
    pub preview: bool,

    /// Accept invalid TLS certificates
    #[arg(long)]
    pub ignore_ssl: bool,

    /// Maximum concurrent downloads [default: 10]
    #[arg(short = 'c', long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Read timeout in seconds [default: 30]
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    #[arg(long)]
    pub user_agent: Option<String>,

    /// Do not send the page URL as Referer
    #[arg(long)]
    pub no_referer: bool,

    /// RON settings file; command-line flags override it
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct TemplateArgs {
    /// Run folder produced by `mirror`
    pub folder: PathBuf,

    #[arg(short, long)]
    pub product: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_mirror_arguments() {
        let cli = Cli::try_parse_from([
            "page-mirror",
            "mirror",
            "https://example.com/landing",
            "--product",
            "Acme Widget",
            "-o",
            "./sites",
            "--preview",
            "-c",
            "4",
        ])
        .unwrap();

        let Command::Mirror(args) = cli.command else {
            panic!("expected mirror subcommand");
        };
        assert_eq!(args.url, "https://example.com/landing");
        assert_eq!(args.product, "Acme Widget");
        assert_eq!(args.output, Some(PathBuf::from("./sites")));
        assert!(args.preview);
        assert!(!args.ignore_ssl);
        assert_eq!(args.concurrency, Some(4));
        assert_eq!(args.timeout, None);
        assert!(!cli.quiet);
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "page-mirror",
            "template",
            "output/acme-widget",
            "-p",
            "Acme",
            "--quiet",
            "--log-file",
            "run.log",
        ])
        .unwrap();

        assert!(cli.quiet);
        assert_eq!(cli.log_file, Some(PathBuf::from("run.log")));
        assert!(matches!(cli.command, Command::Template(ref t) if t.product == "Acme"));
    }

    #[test]
    fn product_is_required() {
        assert!(Cli::try_parse_from(["page-mirror", "mirror", "https://example.com"]).is_err());
    }
}
