#![deny(warnings)]

//! Route generation and optimization for shop orders.
//!
//! This crate provides:
//! - Random route generation bounded by complexity tier, with occasional
//!   rework loops
//! - Template-based routes mapped onto capable departments
//! - Independent substitution passes (speed, cost, reliability, bottleneck
//!   avoidance, priority)
//! - Route metrics (time, cost, reliability, bottleneck risk, flexibility)

mod metrics;
mod optimize;

pub use metrics::{calculate_route_metrics, RouteMetrics};
pub use optimize::{
    bottleneck_pass, cost_pass, department_cost, priority_pass, priority_score, reliability_pass,
    speed_pass, BOTTLENECK_RELIEF, BOTTLENECK_TRIGGER, PRIORITY_MARGIN,
};

use shop_core::{Complexity, CustomerTier, Department, DepartmentId, Priority, Stream};
use tracing::debug;

/// Chance that an immediate repeat is kept, modelling a rework loop.
pub const REWORK_PROBABILITY: f64 = 0.10;

/// A named process flow made of abstract stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessTemplate {
    pub name: &'static str,
    pub stages: &'static [&'static str],
}

const BEGINNER_TEMPLATES: &[ProcessTemplate] = &[
    ProcessTemplate {
        name: "simple-fabrication",
        stages: &["cutting", "assembly", "packaging"],
    },
    ProcessTemplate {
        name: "machine-and-ship",
        stages: &["machining", "quality", "packaging"],
    },
];

const INTERMEDIATE_TEMPLATES: &[ProcessTemplate] = &[
    ProcessTemplate {
        name: "welded-assembly",
        stages: &["cutting", "welding", "assembly", "quality", "packaging"],
    },
    ProcessTemplate {
        name: "painted-assembly",
        stages: &["machining", "assembly", "painting", "quality"],
    },
    ProcessTemplate {
        name: "precision-part",
        stages: &["cutting", "machining", "finishing", "packaging"],
    },
];

const ADVANCED_TEMPLATES: &[ProcessTemplate] = &[
    ProcessTemplate {
        name: "full-fabrication",
        stages: &[
            "cutting",
            "machining",
            "welding",
            "assembly",
            "painting",
            "finishing",
            "quality",
            "packaging",
        ],
    },
    ProcessTemplate {
        name: "structural-frame",
        stages: &[
            "cutting",
            "welding",
            "machining",
            "assembly",
            "quality",
            "painting",
            "packaging",
        ],
    },
];

/// Process templates suited to a complexity tier.
pub fn templates_for(complexity: Complexity) -> &'static [ProcessTemplate] {
    match complexity {
        Complexity::Beginner => BEGINNER_TEMPLATES,
        Complexity::Intermediate => INTERMEDIATE_TEMPLATES,
        Complexity::Advanced => ADVANCED_TEMPLATES,
    }
}

/// Generate a random route whose length lies in the tier's range.
///
/// Immediate repeats are rejected 90% of the time. Returns an empty route
/// when there are no departments.
pub fn generate_route(
    stream: &mut Stream,
    departments: &[DepartmentId],
    complexity: Complexity,
) -> Vec<DepartmentId> {
    if departments.is_empty() {
        return Vec::new();
    }
    let (min, max) = complexity.route_len_range();
    let len = stream.range_usize(min, max);
    let mut route = Vec::with_capacity(len);
    while route.len() < len {
        let Some(&candidate) = stream.choose(departments) else {
            break;
        };
        if route.last() == Some(&candidate)
            && departments.len() > 1
            && !stream.chance(REWORK_PROBABILITY)
        {
            continue;
        }
        route.push(candidate);
    }
    route
}

/// Which optimization passes to run for a route.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteOptions {
    pub complexity: Complexity,
    pub optimize_speed: bool,
    pub optimize_cost: bool,
    pub optimize_reliability: bool,
    pub avoid_bottlenecks: bool,
    pub priority: Priority,
    pub customer: CustomerTier,
}

impl RouteOptions {
    /// No passes, normal priority, standard customer.
    pub fn new(complexity: Complexity) -> Self {
        Self {
            complexity,
            optimize_speed: false,
            optimize_cost: false,
            optimize_reliability: false,
            avoid_bottlenecks: false,
            priority: Priority::Normal,
            customer: CustomerTier::Standard,
        }
    }

    /// VIP customers and urgent orders get the priority pass.
    pub fn wants_priority_pass(&self) -> bool {
        self.customer == CustomerTier::Vip || self.priority == Priority::Urgent
    }
}

/// Build a route from a process template and run the selected passes.
pub fn generate_optimized_route(
    stream: &mut Stream,
    departments: &[Department],
    options: &RouteOptions,
) -> Vec<DepartmentId> {
    if departments.is_empty() {
        return Vec::new();
    }
    let Some(template) = stream.choose(templates_for(options.complexity)) else {
        return Vec::new();
    };

    let mut route: Vec<DepartmentId> = Vec::with_capacity(template.stages.len());
    for stage in template.stages {
        let capable: Vec<DepartmentId> = departments
            .iter()
            .filter(|d| d.handles_stage(stage))
            .map(|d| d.id)
            .collect();
        let picked = match stream.choose(&capable) {
            Some(&id) => Some(id),
            None => stream.choose(departments).map(|d| d.id),
        };
        route.extend(picked);
    }

    if options.optimize_speed {
        route = speed_pass(&route, departments);
    }
    if options.optimize_cost {
        route = cost_pass(&route, departments);
    }
    if options.optimize_reliability {
        route = reliability_pass(&route, departments);
    }
    if options.avoid_bottlenecks {
        route = bottleneck_pass(&route, departments);
    }
    if options.wants_priority_pass() {
        route = priority_pass(&route, departments);
    }
    debug!(template = template.name, steps = route.len(), "optimized route");
    route
}
