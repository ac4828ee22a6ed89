use serde::{Deserialize, Serialize};

/// One of the five lifecycle stages a lost deal is reconstructed against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
	Discovery,
	PricingNegotiation,
	DeliveryPlanning,
	IssueEscalation,
	FinalDecision,
}
impl Phase {
	/// Phases in lifecycle order.
	pub const ALL: [Phase; 5] = [
		Phase::Discovery,
		Phase::PricingNegotiation,
		Phase::DeliveryPlanning,
		Phase::IssueEscalation,
		Phase::FinalDecision,
	];

	pub fn index(self) -> usize {
		self as usize
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Phase::Discovery => "discovery",
			Phase::PricingNegotiation => "pricing_negotiation",
			Phase::DeliveryPlanning => "delivery_planning",
			Phase::IssueEscalation => "issue_escalation",
			Phase::FinalDecision => "final_decision",
		}
	}

	pub fn label(self) -> &'static str {
		match self {
			Phase::Discovery => "Discovery",
			Phase::PricingNegotiation => "Pricing Negotiation",
			Phase::DeliveryPlanning => "Delivery Planning",
			Phase::IssueEscalation => "Issue/Escalation",
			Phase::FinalDecision => "Final Decision",
		}
	}

	pub fn from_label(raw: &str) -> Option<Self> {
		let normalized = raw.trim().to_ascii_lowercase().replace([' ', '/', '-'], "_");

		Self::ALL.into_iter().find(|phase| phase.as_str() == normalized)
	}

	pub fn anchor_keywords(self) -> &'static [&'static str] {
		match self {
			Phase::Discovery => &[
				"initial",
				"first contact",
				"outreach",
				"first call",
				"discovery call",
				"introductory",
				"requirements",
			],
			Phase::PricingNegotiation => &[
				"pricing",
				"price",
				"quote",
				"budget",
				"cost",
				"discount",
				"proposal",
				"negotiation",
			],
			Phase::DeliveryPlanning => &[
				"delivery",
				"implementation",
				"timeline",
				"rollout",
				"deployment",
				"delivery plan",
				"onboarding",
			],
			Phase::IssueEscalation => &[
				"escalation",
				"escalated",
				"issue",
				"problem",
				"concern",
				"delay",
				"blocker",
				"competitor",
			],
			Phase::FinalDecision => &[
				"final",
				"decision",
				"outcome",
				"closed",
				"lost",
				"rejected",
				"selected",
			],
		}
	}

	/// Retrieval query text for this phase.
	pub fn anchor_query(self) -> String {
		format!("{} phase: {}", self.label(), self.anchor_keywords().join(", "))
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
	Positive,
	Neutral,
	Negative,
}
impl Sentiment {
	/// Accepts only the exact lowercase labels.
	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"positive" => Some(Sentiment::Positive),
			"neutral" => Some(Sentiment::Neutral),
			"negative" => Some(Sentiment::Negative),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Sentiment::Positive => "positive",
			Sentiment::Neutral => "neutral",
			Sentiment::Negative => "negative",
		}
	}
}
