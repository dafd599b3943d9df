use serde::Serialize;

/// Flag shared by every scenario.
#[derive(Debug, Clone, Copy, clap::Args)]
pub struct VariantArgs {
    /// Run the corrected variant instead of the leaky one.
    #[arg(long)]
    pub fixed: bool,
}

impl VariantArgs {
    pub fn variant(&self) -> Variant {
        if self.fixed {
            Variant::Fixed
        } else {
            Variant::Leaky
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Leaky,
    Fixed,
}

/// Result of one scenario run.
#[derive(Debug, Serialize)]
pub struct Report<T> {
    pub scenario: &'static str,
    pub variant: Variant,
    #[serde(flatten)]
    pub outcome: T,
}

impl<T> Report<T>
where
    T: Serialize,
{
    pub fn new(scenario: &'static str, variant: Variant, outcome: T) -> Self {
        Self {
            scenario,
            variant,
            outcome,
        }
    }

    /// Writes the report to stdout as pretty JSON.
    pub fn print(&self) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(self)?);
        Ok(())
    }
}
