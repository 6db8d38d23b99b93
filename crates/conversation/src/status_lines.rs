//! Cosmetic progress lines shown while a query is pending.

use rand::seq::SliceRandom;
use rand::Rng;

const FORMULATING: &[&str] = &[
    "Analyzing your request and converting it into a structured query.",
    "Identifying the relevant data fields and tables based on your input.",
    "Constructing a SQL query that accurately reflects your request.",
    "Implementing appropriate filters and parameters for data retrieval.",
    "Optimizing the query for efficient execution and resource utilization.",
    "Finalizing the query and preparing for execution.",
];

const EXECUTING: &[&str] = &[
    "Query submitted successfully. Retrieving your data.",
    "Data retrieval in progress. Please wait…",
    "Accessing the database and gathering the requested information.",
    "Your query is being executed. Results will be displayed shortly.",
    "Fetching your data. This may take a moment depending on the size of the request.",
    "Finalizing results. Almost ready!",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusPool {
    /// "Formulating the query" lines
    Formulating,
    /// "Executing the query" lines
    Executing,
}

impl StatusPool {
    pub fn lines(&self) -> &'static [&'static str] {
        match self {
            StatusPool::Formulating => FORMULATING,
            StatusPool::Executing => EXECUTING,
        }
    }

    pub fn other(&self) -> StatusPool {
        match self {
            StatusPool::Formulating => StatusPool::Executing,
            StatusPool::Executing => StatusPool::Formulating,
        }
    }

    /// Uniformly random line from this pool.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &'static str {
        self.lines().choose(rng).copied().unwrap_or_default()
    }
}
