//! Run report: per-category counts and ratios.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::Category;
use crate::scheduler::PoolStats;

/// Number of products per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub not_found: usize,
    pub not_unique: usize,
    pub variant_mismatch: usize,
    pub price_stock_mismatch: usize,
    pub ok: usize,
    pub fetch_failed: usize,
}

impl CategoryCounts {
    pub fn get(&self, category: Category) -> usize {
        match category {
            Category::NotFound => self.not_found,
            Category::NotUnique => self.not_unique,
            Category::VariantMismatch => self.variant_mismatch,
            Category::PriceStockMismatch => self.price_stock_mismatch,
            Category::Ok => self.ok,
            Category::FetchFailed => self.fetch_failed,
        }
    }

    pub fn increment(&mut self, category: Category) {
        let slot = match category {
            Category::NotFound => &mut self.not_found,
            Category::NotUnique => &mut self.not_unique,
            Category::VariantMismatch => &mut self.variant_mismatch,
            Category::PriceStockMismatch => &mut self.price_stock_mismatch,
            Category::Ok => &mut self.ok,
            Category::FetchFailed => &mut self.fetch_failed,
        };
        *slot += 1;
    }

    /// Sum over every category.
    pub fn total(&self) -> usize {
        Category::ALL.iter().map(|c| self.get(*c)).sum()
    }
}

/// `numerator / denominator`, or 0 when the denominator is 0.
pub fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Products checked.
    pub products: usize,
    pub counts: CategoryCounts,
    /// Variants that reached the price/stock comparison.
    pub total_variants: usize,
    /// Variants whose price or stock disagreed with the pricing source.
    pub mismatched_variants: usize,
    /// Correction events produced.
    pub corrections: usize,
    /// Category count over products checked.
    pub ratios: BTreeMap<Category, f64>,
    /// Mismatched variants over total variants.
    pub price_stock_ratio: f64,
    /// Worker pool counters for the run.
    pub workers: PoolStats,
}

impl AuditReport {
    pub fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        counts: CategoryCounts,
        total_variants: usize,
        mismatched_variants: usize,
        corrections: usize,
    ) -> Self {
        let products = counts.total();
        let ratios = Category::ALL
            .iter()
            .map(|c| (*c, ratio(counts.get(*c), products)))
            .collect();

        Self {
            run_id,
            started_at,
            finished_at: Utc::now(),
            products,
            counts,
            total_variants,
            mismatched_variants,
            corrections,
            ratios,
            price_stock_ratio: ratio(mismatched_variants, total_variants),
            workers: PoolStats::default(),
        }
    }

    /// Attaches the worker pool counters.
    pub fn with_workers(mut self, workers: PoolStats) -> Self {
        self.workers = workers;
        self
    }

    pub fn count(&self, category: Category) -> usize {
        self.counts.get(category)
    }

    pub fn ratio(&self, category: Category) -> f64 {
        ratio(self.counts.get(category), self.products)
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {} ({:.1}s)", self.run_id, self.duration_secs())?;
        writeln!(f, "Number of products: {}", self.products)?;
        for category in [Category::NotFound, Category::NotUnique, Category::VariantMismatch] {
            writeln!(
                f,
                "{}: {} {:.4}",
                category,
                self.count(category),
                self.ratio(category)
            )?;
        }
        writeln!(
            f,
            "Number of correctly created variants: {}",
            self.total_variants
        )?;
        writeln!(
            f,
            "{}: {} {:.4}",
            Category::PriceStockMismatch,
            self.mismatched_variants,
            self.price_stock_ratio
        )?;
        writeln!(
            f,
            "{}: {} {:.4}",
            Category::Ok,
            self.count(Category::Ok),
            self.ratio(Category::Ok)
        )?;
        if self.counts.fetch_failed > 0 {
            writeln!(
                f,
                "{}: {} {:.4}",
                Category::FetchFailed,
                self.counts.fetch_failed,
                self.ratio(Category::FetchFailed)
            )?;
        }
        writeln!(f, "Corrections: {}", self.corrections)?;
        write!(
            f,
            "Workers: {}, jobs processed: {} ({} failed), average job: {} ms",
            self.workers.num_workers,
            self.workers.total_processed(),
            self.workers.jobs_failed,
            self.workers.average_job_ms
        )
    }
}
