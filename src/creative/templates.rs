use crate::types::{HypothesisKind, ImpactTier};

/// Copy skeleton for one recommendation. Placeholders: `{benefit}`, `{issue}`,
/// `{cta}`, `{tier}`.
#[derive(Debug, Clone, Copy)]
pub struct Template {
    pub headline: &'static str,
    pub message: &'static str,
    pub cta: &'static str,
    pub rationale: &'static str,
}

const ROAS_DROP: [Template; 3] = [
    Template {
        headline: "{benefit}, worth every cent",
        message: "{issue}. Lead with the value that converted before the drop: {benefit}. {cta}.",
        cta: "Shop now",
        rationale: "Value-first copy to win back conversion efficiency ({tier} impact)",
    },
    Template {
        headline: "Only this week: {benefit}",
        message: "{issue}. Pair the proven benefit with a time-boxed offer. {cta}.",
        cta: "Claim offer",
        rationale: "Benefit plus urgency, the pattern of the pre-drop top performers",
    },
    Template {
        headline: "Why customers choose {benefit}",
        message: "{issue}. Add social proof to the landing message before raising bids. {cta}.",
        cta: "See reviews",
        rationale: "Trust signals to lift purchase rate on existing traffic",
    },
];

const CTR_DROP: [Template; 3] = [
    Template {
        headline: "New: {benefit}",
        message: "{issue}. Open with a fresh hook so the ad earns the click: {benefit}. {cta}.",
        cta: "Learn more",
        rationale: "New hook to recover click-through ({tier} impact)",
    },
    Template {
        headline: "{benefit}? See how",
        message: "{issue}. Turn the benefit into a question to invite curiosity. {cta}.",
        cta: "Find out",
        rationale: "Question-led headline to restore engagement",
    },
    Template {
        headline: "{benefit} in 30 seconds",
        message: "{issue}. Test a short demo format against the current creative. {cta}.",
        cta: "Watch now",
        rationale: "Format change to separate message fatigue from format fatigue",
    },
];

const FATIGUE: [Template; 3] = [
    Template {
        headline: "Meet the new {benefit}",
        message: "{issue}. Rotate in a new visual for the same offer: {benefit}. {cta}.",
        cta: "Discover",
        rationale: "Creative rotation while reach keeps growing ({tier} impact)",
    },
    Template {
        headline: "{benefit}, seen differently",
        message: "{issue}. Cap frequency and refresh the angle for returning viewers. {cta}.",
        cta: "Take a look",
        rationale: "Fresh angle for an audience that has seen the current ad",
    },
    Template {
        headline: "Your take on {benefit}",
        message: "{issue}. Swap in user-generated content to reset ad recall. {cta}.",
        cta: "Join in",
        rationale: "UGC variant to counter repeated exposure",
    },
];

const SPEND_SHIFT: [Template; 3] = [
    Template {
        headline: "{benefit}, made for you",
        message: "{issue}. Move the added budget back to the audience that converted: {benefit}. {cta}.",
        cta: "Shop now",
        rationale: "Tighter targeting for incremental spend ({tier} impact)",
    },
    Template {
        headline: "Back by demand: {benefit}",
        message: "{issue}. Retarget past engagers before scaling prospecting again. {cta}.",
        cta: "Get yours",
        rationale: "Retargeting copy for the highest-intent segment",
    },
    Template {
        headline: "{benefit}, the smart pick",
        message: "{issue}. Hold spend flat until the new adsets match baseline ROAS. {cta}.",
        cta: "Compare now",
        rationale: "Comparison copy while the budget mix is rebalanced",
    },
];

/// Recommendations produced per insight.
pub fn count_for(tier: ImpactTier) -> usize {
    match tier {
        ImpactTier::High => 3,
        ImpactTier::Medium => 2,
        ImpactTier::Low => 1,
    }
}

/// Templates for an insight of `kind` at `tier`, highest priority first.
pub fn templates_for(kind: HypothesisKind, tier: ImpactTier) -> &'static [Template] {
    let all: &'static [Template; 3] = match kind {
        HypothesisKind::RoasDrop => &ROAS_DROP,
        HypothesisKind::CtrDrop => &CTR_DROP,
        HypothesisKind::CreativeFatigue => &FATIGUE,
        HypothesisKind::SpendShift => &SPEND_SHIFT,
    };
    &all[..count_for(tier)]
}

/// Substitutes every placeholder in `template`.
pub fn render(template: &str, benefit: &str, issue: &str, cta: &str, tier: ImpactTier) -> String {
    template
        .replace("{benefit}", benefit)
        .replace("{issue}", issue)
        .replace("{cta}", cta)
        .replace("{tier}", &tier.to_string())
}
