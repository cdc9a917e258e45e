mod progress;
mod styling;
mod summary;
mod tables;

pub use progress::Spinner;
pub use styling::{dim, magenta_bold};
pub use summary::print_report;

/// Prints the `glmigrate` banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🚚 glmigrate"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("GitLab to GitHub migration")
    );
}
