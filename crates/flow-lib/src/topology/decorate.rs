//! Edge visual encoding from traffic statistics

use super::elements::{AnimationSpeed, EdgeStyle, TagStatus};
use super::options::TopologyOptions;
use crate::model::metrics::{format_stat, MetricFunction, MetricType};

pub fn edge_style(stat: f64) -> EdgeStyle {
    if stat > 0.0 {
        EdgeStyle::Dashed
    } else {
        EdgeStyle::Dotted
    }
}

/// Five speed tiers by share of the largest stat in view
pub fn animation_speed(stat: f64, max_edge_stat: f64) -> AnimationSpeed {
    if max_edge_stat == 0.0 {
        return AnimationSpeed::None;
    }
    let ratio = stat / max_edge_stat;
    if ratio > 4.0 / 5.0 {
        AnimationSpeed::Fast
    } else if ratio > 3.0 / 5.0 {
        AnimationSpeed::MediumFast
    } else if ratio > 2.0 / 5.0 {
        AnimationSpeed::Medium
    } else if ratio > 1.0 / 5.0 {
        AnimationSpeed::MediumSlow
    } else {
        AnimationSpeed::Slow
    }
}

pub fn tag_status(stat: f64, max_edge_stat: f64) -> TagStatus {
    if max_edge_stat == 0.0 {
        return TagStatus::Default;
    }
    let ratio = stat / max_edge_stat;
    if ratio > 3.0 / 5.0 {
        TagStatus::Warning
    } else if ratio > 2.0 / 5.0 {
        TagStatus::Info
    } else {
        TagStatus::Default
    }
}

/// Function whose unit the tag is rendered in: volumes read as rates
/// unless summed
pub fn tag_function(metric_type: MetricType, selected: MetricFunction) -> MetricFunction {
    if selected != MetricFunction::Sum && metric_type.is_volume() {
        MetricFunction::Rate
    } else {
        selected
    }
}

pub fn edge_tag(stat: f64, options: &TopologyOptions) -> Option<String> {
    if !options.edge_tags || stat <= 0.0 {
        return None;
    }
    let function = tag_function(options.metric_type, options.metric_function);
    Some(format_stat(stat, options.metric_type, function))
}
