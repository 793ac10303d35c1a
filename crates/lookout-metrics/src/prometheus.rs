//! Prometheus text exposition format.

use std::fmt::Write;

use crate::registry::{Counter, Family, Gauge, Histogram, Metrics};

/// Render every family of the registry into Prometheus text format.
pub fn render_prometheus(metrics: &Metrics) -> String {
    let mut out = String::new();
    render_histograms(&mut out, &metrics.lock_wait);
    render_histograms(&mut out, &metrics.check_run_duration);
    render_gauges(&mut out, &metrics.parallelism);
    render_histograms(&mut out, &metrics.request_duration);
    render_counters(&mut out, &metrics.request_summary);
    render_histograms(&mut out, &metrics.scheduler_lag);
    out
}

fn header<M>(out: &mut String, family: &Family<M>, kind: &str) {
    let _ = writeln!(out, "# HELP {} {}", family.name(), family.help());
    let _ = writeln!(out, "# TYPE {} {kind}", family.name());
}

fn render_counters(out: &mut String, family: &Family<Counter>) {
    header(out, family, "counter");
    for (values, counter) in family.children() {
        let labels = format_labels(family.label_names(), &values, None);
        let _ = writeln!(out, "{}{labels} {}", family.name(), counter.get());
    }
}

fn render_gauges(out: &mut String, family: &Family<Gauge>) {
    header(out, family, "gauge");
    for (values, gauge) in family.children() {
        let labels = format_labels(family.label_names(), &values, None);
        let _ = writeln!(out, "{}{labels} {}", family.name(), gauge.get());
    }
}

fn render_histograms(out: &mut String, family: &Family<Histogram>) {
    header(out, family, "histogram");
    let name = family.name();
    for (values, histogram) in family.children() {
        for (bound, count) in histogram.buckets() {
            let le = if bound.is_infinite() {
                "+Inf".to_string()
            } else {
                bound.to_string()
            };
            let labels = format_labels(family.label_names(), &values, Some(&le));
            let _ = writeln!(out, "{name}_bucket{labels} {count}");
        }
        let labels = format_labels(family.label_names(), &values, None);
        let _ = writeln!(out, "{name}_sum{labels} {}", histogram.sum());
        let _ = writeln!(out, "{name}_count{labels} {}", histogram.count());
    }
}

fn format_labels(names: &[&str], values: &[String], le: Option<&str>) -> String {
    let mut pairs: Vec<String> = names
        .iter()
        .zip(values)
        .map(|(name, value)| format!("{name}=\"{}\"", escape(value)))
        .collect();
    if let Some(le) = le {
        pairs.push(format!("le=\"{le}\""));
    }
    if pairs.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", pairs.join(","))
    }
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
