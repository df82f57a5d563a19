//! Human-readable run report. Pure string building; no timestamps, so the
//! same outcome renders the same text.

use std::collections::BTreeSet;
use std::fmt::Write;

use crate::creative::synthesizer::{describe_issue, format_value};
use crate::pipeline::{CampaignFinding, RunOutcome};
use crate::planner::SelectionBasis;
use crate::report::artifacts::ArtifactPaths;
use crate::types::{Evidence, HypothesisKind};

pub fn render_report(outcome: &RunOutcome, paths: &ArtifactPaths) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Analysis report\n");
    let _ = writeln!(out, "Task: {}\n", outcome.task);

    executive_summary(&mut out, outcome);
    findings(&mut out, outcome);
    prescriptions(&mut out, outcome);
    next_steps(&mut out, outcome);

    let _ = writeln!(out, "## Files produced\n");
    for p in [&paths.insights, &paths.creatives, &paths.report] {
        let _ = writeln!(out, "- `{}`", p.display());
    }
    out
}

fn executive_summary(out: &mut String, o: &RunOutcome) {
    let s = &o.summary;
    let _ = writeln!(out, "## Executive summary\n");
    match s.date_range {
        Some((from, to)) => {
            let _ = writeln!(
                out,
                "- Data: {} rows, {} campaign(s), {from} to {to}",
                s.rows, s.campaigns_count
            );
        }
        None => {
            let _ = writeln!(out, "- Data: no usable rows");
        }
    }
    if o.schema.has_warnings() {
        let zero_flags: usize = o.schema.zero_flags.values().sum();
        let _ = writeln!(
            out,
            "- Data quality ({}): {} row(s) dropped, {} row(s) with corrected cells, {} zero-value flag(s), {} ignored column(s)",
            o.schema.policy,
            o.schema.rows_dropped,
            o.schema.rows_affected,
            zero_flags,
            o.schema.unexpected_columns.len(),
        );
    }
    let _ = writeln!(
        out,
        "- Spend {:.2}, revenue {:.2}, average CTR {:.2}%, average ROAS {:.2}",
        s.total_spend,
        s.total_revenue,
        s.avg_ctr * 100.0,
        s.avg_roas
    );
    if let Some(best) = s.top_by_roas.first() {
        let _ = writeln!(out, "- Best mean ROAS: {} ({:.2})", best.campaign, best.mean_roas);
    }

    if o.plan.selected.is_empty() {
        let _ = writeln!(out, "\nNo campaign met the decline criteria.\n");
        return;
    }
    let validated: usize = o.insights.values().map(Vec::len).sum();
    let recs: usize = o.creatives.values().map(Vec::len).sum();
    let _ = writeln!(
        out,
        "- {} of {} campaign(s) declined enough to analyze; {validated} validated insight(s), {recs} recommendation(s)",
        o.plan.selected.len(),
        s.campaigns_count,
    );
    if let Some(worst) = o.plan.selected.first() {
        let _ = writeln!(
            out,
            "- Largest decline: {} (ROAS {:.2} → {:.2}{})",
            worst.campaign,
            worst.pre_roas,
            worst.post_roas,
            worst
                .drop_pct
                .map(|p| format!(", -{p:.1}%"))
                .unwrap_or_default(),
        );
    }
    out.push('\n');
}

fn findings(out: &mut String, o: &RunOutcome) {
    let _ = writeln!(out, "## Per-campaign findings\n");
    if o.findings.is_empty() {
        let _ = writeln!(out, "Nothing to report.\n");
        return;
    }
    for f in &o.findings {
        campaign_finding(out, o, f);
    }
}

fn campaign_finding(out: &mut String, o: &RunOutcome, f: &CampaignFinding) {
    let sel = &f.selection;
    let basis = match sel.basis {
        SelectionBasis::PercentDrop => "percent drop",
        SelectionBasis::AbsoluteDrop => "absolute drop",
    };
    let _ = writeln!(out, "### {}\n", sel.campaign);
    let _ = writeln!(
        out,
        "ROAS {:.2} → {:.2} over {} day(s), selected on {basis}.\n",
        sel.pre_roas, sel.post_roas, sel.points
    );

    match o.insights.get(&sel.campaign) {
        Some(insights) => {
            let _ = writeln!(
                out,
                "| Hypothesis | Metric | Pre | Post | Change | p-value | Impact | Confidence |"
            );
            let _ = writeln!(out, "|---|---|---|---|---|---|---|---|");
            for i in insights {
                let e = &i.evidence;
                let _ = writeln!(
                    out,
                    "| {} | {} | {} | {} | {} | {:.3} | {} | {:.2} |",
                    i.hypothesis,
                    e.metric.label(),
                    format_value(e.metric, e.pre),
                    format_value(e.metric, e.post),
                    change(e),
                    e.p_value,
                    i.impact,
                    i.confidence,
                );
            }
            out.push('\n');
        }
        None => {
            let _ = writeln!(out, "No hypothesis cleared the confidence threshold.\n");
        }
    }

    if !f.rejected.is_empty() {
        let list: Vec<String> = f
            .rejected
            .iter()
            .map(|r| format!("{} ({:.2})", r.id, r.confidence))
            .collect();
        let _ = writeln!(out, "Low confidence, not surfaced: {}\n", list.join(", "));
    }
    if !f.errors.is_empty() {
        let _ = writeln!(out, "Could not evaluate: {}\n", f.errors.join(", "));
    }
}

fn prescriptions(out: &mut String, o: &RunOutcome) {
    let _ = writeln!(out, "## Creative prescriptions\n");
    if o.creatives.is_empty() {
        let _ = writeln!(out, "None.\n");
        return;
    }
    for (campaign, recs) in &o.creatives {
        let _ = writeln!(out, "### {campaign}\n");
        for (n, r) in recs.iter().enumerate() {
            let _ = writeln!(out, "{}. **{}** ({})", n + 1, r.headline, r.cta);
            let _ = writeln!(out, "   {}", r.message);
            let _ = writeln!(out, "   _{}; addresses `{}`_", r.rationale, r.linked_issue);
        }
        out.push('\n');
    }
}

fn next_steps(out: &mut String, o: &RunOutcome) {
    let _ = writeln!(out, "## Next steps\n");
    let kinds: BTreeSet<HypothesisKind> = o
        .insights
        .values()
        .flatten()
        .map(|i| i.kind)
        .collect();

    let mut steps: Vec<String> = kinds
        .iter()
        .map(|k| {
            let campaigns: Vec<&str> = o
                .insights
                .iter()
                .filter(|(_, is)| is.iter().any(|i| i.kind == *k))
                .map(|(c, _)| c.as_str())
                .collect();
            let action = match k {
                HypothesisKind::RoasDrop => "Audit bids, offers and landing pages",
                HypothesisKind::CtrDrop => "A/B test the proposed hooks against the current creative",
                HypothesisKind::CreativeFatigue => "Rotate creatives and cap frequency",
                HypothesisKind::SpendShift => "Rebalance budget toward the adsets that held ROAS",
            };
            format!("{action} for {}.", campaigns.join(", "))
        })
        .collect();

    let rejected: Vec<&str> = o
        .findings
        .iter()
        .filter(|f| !f.rejected.is_empty())
        .map(|f| f.selection.campaign.as_str())
        .collect();
    if !rejected.is_empty() {
        steps.push(format!(
            "Collect more days of data for {} before acting on low-confidence signals.",
            rejected.join(", ")
        ));
    }
    if steps.is_empty() {
        steps.push("No action needed; re-run when new data arrives.".to_string());
    }
    for s in steps {
        let _ = writeln!(out, "- {s}");
    }
    out.push('\n');
}

fn change(e: &Evidence) -> String {
    e.delta_pct
        .map(|p| format!("{p:+.1}%"))
        .unwrap_or_else(|| "n/a".to_string())
}

/// One-line description used in logs: statement plus the numbers behind it.
pub fn headline_finding(o: &RunOutcome) -> Option<String> {
    o.insights
        .values()
        .flatten()
        .max_by(|a, b| {
            a.impact
                .cmp(&b.impact)
                .then_with(|| a.confidence.total_cmp(&b.confidence))
                .then_with(|| b.campaign.cmp(&a.campaign))
        })
        .map(|i| format!("{}: {}", i.campaign, describe_issue(&i.hypothesis, &i.evidence)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RejectedInsight;
    use crate::planner::{Plan, SelectedCampaign};
    use crate::schema::SchemaReport;
    use crate::summary::DataSummary;
    use crate::types::{ImpactTier, Metric, Recommendation, ValidatedInsight};
    use std::collections::BTreeMap;
    use std::path::Path;

    fn outcome() -> RunOutcome {
        let selection = SelectedCampaign {
            campaign: "spring_sale".to_string(),
            basis: SelectionBasis::PercentDrop,
            points: 10,
            pre_roas: 2.37,
            post_roas: 1.58,
            drop_pct: Some(33.3),
            abs_drop: 0.79,
            severity: 33.3,
        };
        let insight = ValidatedInsight {
            id: "h_roas_drop".to_string(),
            kind: HypothesisKind::RoasDrop,
            campaign: "spring_sale".to_string(),
            hypothesis: HypothesisKind::RoasDrop.statement().to_string(),
            segment: "overall".to_string(),
            evidence: Evidence {
                metric: Metric::Roas,
                pre: 2.37,
                post: 1.58,
                delta_abs: -0.79,
                delta_pct: Some(-33.33),
                p_value: 0.009,
                n_pre: 5,
                n_post: 5,
            },
            supporting: Vec::new(),
            impact: ImpactTier::High,
            confidence: 0.71,
        };
        let rec = Recommendation {
            id: "h_roas_drop_1".to_string(),
            headline: "Fresh coffee, worth every cent".to_string(),
            message: "ROAS decreased significantly vs baseline (2.37 → 1.58, -33.3%).".to_string(),
            cta: "Shop now".to_string(),
            rationale: "Value-first copy".to_string(),
            linked_issue: "h_roas_drop".to_string(),
        };
        RunOutcome {
            task: "Analyze ROAS drop".to_string(),
            summary: DataSummary::default(),
            schema: SchemaReport::default(),
            plan: Plan {
                task: "Analyze ROAS drop".to_string(),
                selected: vec![selection.clone()],
                skipped: Vec::new(),
            },
            findings: vec![CampaignFinding {
                selection,
                hypotheses: vec!["h_roas_drop".to_string(), "h_ctr_drop".to_string()],
                rejected: vec![RejectedInsight { id: "h_ctr_drop".to_string(), confidence: 0.2 }],
                errors: Vec::new(),
            }],
            insights: BTreeMap::from([("spring_sale".to_string(), vec![insight])]),
            creatives: BTreeMap::from([("spring_sale".to_string(), vec![rec])]),
        }
    }

    #[test]
    fn report_has_every_section_in_order() {
        let text = render_report(&outcome(), &ArtifactPaths::in_dir(Path::new("reports")));
        let sections = [
            "## Executive summary",
            "## Per-campaign findings",
            "## Creative prescriptions",
            "## Next steps",
            "## Files produced",
        ];
        let positions: Vec<usize> = sections.iter().map(|s| text.find(s).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(text.contains("Task: Analyze ROAS drop"));
        assert!(text.contains("| ROAS decreased significantly vs baseline | ROAS | 2.37 | 1.58 | -33.3% |"));
        assert!(text.contains("Low confidence, not surfaced: h_ctr_drop (0.20)"));
        assert!(text.contains("Audit bids, offers and landing pages for spring_sale."));
        assert!(text.contains("reports/insights.json"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let paths = ArtifactPaths::in_dir(Path::new("out"));
        assert_eq!(render_report(&outcome(), &paths), render_report(&outcome(), &paths));
    }

    #[test]
    fn headline_picks_strongest_insight() {
        let line = headline_finding(&outcome()).unwrap();
        assert_eq!(line, "spring_sale: ROAS decreased significantly vs baseline (2.37 → 1.58, -33.3%)");
    }
}
