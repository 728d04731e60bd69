//! Quick-reply suggestions
//!
//! The model proposes replies first. Whatever it does not supply is filled
//! from canned replies for the current guided-flow stage, so the client
//! always receives exactly three.

use bankbot_config::DomainCatalog;
use bankbot_core::{FlowStage, RequiredField};
use bankbot_llm::gateway::MAX_SUGGESTIONS;
use bankbot_llm::SuggestionRequest;

/// Stage the suggestions should help with
///
/// An explicit missing-field list from the client wins, then the stage the
/// last turn reported, then the draft.
pub fn target_stage(request: &SuggestionRequest) -> FlowStage {
    let first_missing = request
        .missing_fields
        .iter()
        .find_map(|name| RequiredField::from_crm_name(name));

    match first_missing {
        Some(RequiredField::Reason) => FlowStage::Reason,
        Some(RequiredField::Date | RequiredField::Time) => FlowStage::Time,
        Some(RequiredField::Location) => FlowStage::Location,
        None => request
            .stage
            .unwrap_or_else(|| request.guided_flow.stage()),
    }
}

/// Canned replies for a stage
pub fn local_suggestions(stage: FlowStage, catalog: &DomainCatalog) -> Vec<String> {
    match stage {
        FlowStage::Reason => vec![
            "I'd like to open a new account".to_string(),
            "I need help with a loan".to_string(),
            "I want to talk about investments".to_string(),
        ],
        FlowStage::Time => vec![
            "Tomorrow at 10:00 AM".to_string(),
            "Next Monday at 2:00 PM".to_string(),
            "This Friday at 11:30 AM".to_string(),
        ],
        FlowStage::Location => {
            let mut replies: Vec<String> = catalog
                .branches
                .location_names()
                .into_iter()
                .take(MAX_SUGGESTIONS)
                .map(|name| format!("The {} branch", name))
                .collect();
            if replies.len() < MAX_SUGGESTIONS {
                replies.push(format!("Where is the {}?", catalog.branches.lookup_phrase));
            }
            replies
        }
        FlowStage::Confirmation => vec![
            "Yes, please confirm".to_string(),
            "I need to change the time".to_string(),
            "Cancel this appointment".to_string(),
        ],
        FlowStage::Completed | FlowStage::Cancelled => vec![
            "Book another appointment".to_string(),
            "Show my appointments".to_string(),
            "That's all, thanks".to_string(),
        ],
    }
}

const GENERIC_REPLIES: [&str; 3] = ["Yes", "No", "Tell me more"];

/// Top up model replies to exactly three, without duplicates
pub fn complete(
    from_model: Vec<String>,
    request: &SuggestionRequest,
    catalog: &DomainCatalog,
) -> Vec<String> {
    let mut replies: Vec<String> = Vec::with_capacity(MAX_SUGGESTIONS);
    let local = local_suggestions(target_stage(request), catalog);
    let candidates = from_model
        .into_iter()
        .chain(local)
        .chain(GENERIC_REPLIES.iter().map(|s| s.to_string()));

    for reply in candidates {
        if replies.len() == MAX_SUGGESTIONS {
            break;
        }
        let trimmed = reply.trim();
        if trimmed.is_empty() || replies.iter().any(|r| r.eq_ignore_ascii_case(trimmed)) {
            continue;
        }
        replies.push(trimmed.to_string());
    }
    replies
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankbot_core::GuidedFlow;

    fn request(flow: GuidedFlow, missing: &[&str]) -> SuggestionRequest {
        SuggestionRequest {
            guided_flow: flow,
            missing_fields: missing.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_stage_from_missing_fields() {
        let req = request(GuidedFlow::default(), &["Location__c"]);
        assert_eq!(target_stage(&req), FlowStage::Location);

        let req = request(GuidedFlow::default(), &["unknown", "Appointment_Time__c"]);
        assert_eq!(target_stage(&req), FlowStage::Time);
    }

    #[test]
    fn test_stage_from_draft() {
        let flow = GuidedFlow {
            reason: Some("Loan".to_string()),
            ..Default::default()
        };
        assert_eq!(target_stage(&request(flow, &[])), FlowStage::Time);
    }

    #[test]
    fn test_stage_after_commit() {
        let req = SuggestionRequest {
            stage: Some(FlowStage::Cancelled),
            ..Default::default()
        };
        assert_eq!(target_stage(&req), FlowStage::Cancelled);

        let catalog = DomainCatalog::default();
        let replies = complete(Vec::new(), &req, &catalog);
        assert_eq!(replies[0], "Book another appointment");
    }

    #[test]
    fn test_location_suggestions_use_catalog() {
        let catalog = DomainCatalog::default();
        let replies = local_suggestions(FlowStage::Location, &catalog);
        assert_eq!(replies[0], "The Downtown branch");
        assert_eq!(replies.len(), 3);
    }

    #[test]
    fn test_complete_pads_and_dedupes() {
        let catalog = DomainCatalog::default();
        let req = request(GuidedFlow::default(), &[]);
        let replies = complete(
            vec!["I need help with a loan".to_string(), "  ".to_string()],
            &req,
            &catalog,
        );
        assert_eq!(
            replies,
            vec![
                "I need help with a loan".to_string(),
                "I'd like to open a new account".to_string(),
                "I want to talk about investments".to_string(),
            ]
        );
    }

    #[test]
    fn test_complete_truncates_model_output() {
        let catalog = DomainCatalog::default();
        let req = request(GuidedFlow::default(), &[]);
        let replies = complete(
            (1..=5).map(|i| format!("Reply {}", i)).collect(),
            &req,
            &catalog,
        );
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[2], "Reply 3");
    }
}
