use crate::cache::{PaginationParams, SortOrder};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;

/// Back-office cache client for the tour marketplace admin API.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log formatter to use
    #[arg(long, value_enum, default_value_t = default_tracing_format())]
    pub tracing: TracingFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingFormat {
    /// Use pretty formatter (default in debug mode)
    Pretty,
    /// Use JSON formatter (default in release mode)
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch one page of a resource list
    List {
        resource: ResourceName,
        #[command(flatten)]
        query: ListQuery,
    },
    /// Fetch a single entity by id
    Get { resource: ResourceName, id: String },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceName {
    Tours,
    Employees,
    Travelers,
    Companies,
    Messages,
    PasswordResets,
    Reports,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ListQuery {
    #[arg(long, default_value_t = 1)]
    pub page: u32,
    #[arg(long, default_value_t = 20)]
    pub limit: u32,
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long)]
    pub sort: Option<String>,
    #[arg(long, value_enum)]
    pub order: Option<SortOrder>,
    /// Filter as `name=value`; comma-separated values become a list
    #[arg(long = "filter", value_parser = parse_filter)]
    pub filters: Vec<(String, Value)>,
}

impl ListQuery {
    pub fn to_params(&self) -> PaginationParams {
        let mut params = PaginationParams::new(self.page, self.limit);
        params.search = self.search.clone();
        params.sort = self.sort.clone();
        params.order = self.order;
        for (name, value) in &self.filters {
            params.filters.insert(name.clone(), value.clone());
        }
        params
    }
}

fn parse_filter(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("filter name is empty in {raw:?}"));
    }
    let value = if value.contains(',') {
        Value::Array(
            value
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| Value::String(v.to_owned()))
                .collect(),
        )
    } else {
        Value::String(value.trim().to_owned())
    };
    Ok((name.to_owned(), value))
}

const fn default_tracing_format() -> TracingFormat {
    if cfg!(debug_assertions) {
        TracingFormat::Pretty
    } else {
        TracingFormat::Json
    }
}
