//! Prometheus text exposition format.
//!
//! Renders an autoscaler metrics snapshot for scraping by a Prometheus
//! server or compatible agent.

use std::fmt::Write;

use crate::collector::MetricsSnapshot;

/// Render a metrics snapshot into Prometheus text format.
pub fn render_prometheus(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();

    out.push_str("# HELP auklet_services_monitored Number of services currently monitored by Auklet.\n");
    out.push_str("# TYPE auklet_services_monitored gauge\n");
    let _ = writeln!(out, "auklet_services_monitored {}", snapshot.services_monitored);

    out.push_str("# HELP auklet_prometheus_queries_total Total number of Prometheus queries executed.\n");
    out.push_str("# TYPE auklet_prometheus_queries_total counter\n");
    let _ = writeln!(out, "auklet_prometheus_queries_total {}", snapshot.queries_total);

    out.push_str("# HELP auklet_prometheus_query_errors_total Total number of failed Prometheus queries.\n");
    out.push_str("# TYPE auklet_prometheus_query_errors_total counter\n");
    let _ = writeln!(
        out,
        "auklet_prometheus_query_errors_total {}",
        snapshot.query_errors_total
    );

    out.push_str("# HELP auklet_scale_events_total Total number of scale events issued.\n");
    out.push_str("# TYPE auklet_scale_events_total counter\n");
    let _ = writeln!(out, "auklet_scale_events_total {}", snapshot.scale_events_total);

    out.push_str("# HELP auklet_service_scale_up_events_count Number of times the service was scaled up.\n");
    out.push_str("# TYPE auklet_service_scale_up_events_count counter\n");
    for s in &snapshot.services {
        let _ = writeln!(
            out,
            "auklet_service_scale_up_events_count{{service=\"{}\",service_id=\"{}\"}} {}",
            escape_label(&s.service_name),
            escape_label(&s.service_id),
            s.scale_up_events
        );
    }

    out.push_str("# HELP auklet_service_scale_down_events_count Number of times the service was scaled down.\n");
    out.push_str("# TYPE auklet_service_scale_down_events_count counter\n");
    for s in &snapshot.services {
        let _ = writeln!(
            out,
            "auklet_service_scale_down_events_count{{service=\"{}\",service_id=\"{}\"}} {}",
            escape_label(&s.service_name),
            escape_label(&s.service_id),
            s.scale_down_events
        );
    }

    out
}

/// Escape a label value per the exposition format.
fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
