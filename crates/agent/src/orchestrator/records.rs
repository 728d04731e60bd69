//! Direct CRM operations behind the authenticated endpoints

use bankbot_core::appointment::crm_names;
use bankbot_core::{datetime, AppointmentAction, AppointmentDetails, Error, Result};
use bankbot_crm::{AppointmentData, AppointmentRecord, BankerNote, VisitRecord, DEFAULT_VISIT_LIMIT};

use super::ChatOrchestrator;
use crate::types::{
    BookingOutcome, ProductRecommendation, RecommendationSource, RecommendationsOutcome,
};

const MAX_RECOMMENDATIONS: usize = 3;

/// All four fields present and combinable into an instant
fn checked_instant(details: &AppointmentDetails) -> Result<String> {
    let missing = details.missing_required();
    if !missing.is_empty() {
        return Err(Error::MissingParameters(crm_names(&missing).join(", ")));
    }
    let date = details.date.as_deref().unwrap_or_default().trim().to_string();
    let time = details.time.as_deref().unwrap_or_default().trim().to_string();
    match datetime::combine(&date, &time) {
        Some(instant) => Ok(instant),
        None => Err(Error::InvalidDateTime { date, time }),
    }
}

impl ChatOrchestrator {
    pub async fn list_appointments(&self) -> Result<Vec<AppointmentRecord>> {
        Ok(self
            .crm
            .appointments
            .list_for_contact(self.tenant.contact_id())
            .await?)
    }

    /// Book without going through the chat flow
    pub async fn book_appointment(&self, details: &AppointmentDetails) -> Result<BookingOutcome> {
        let instant = checked_instant(details)?;
        let data = AppointmentData::booking(self.tenant.contact_id(), details, instant.clone());
        let id = self.crm.appointments.create(&data).await?;
        metrics::counter!("bankbot_crm_writes_total", "kind" => AppointmentAction::Book.as_str())
            .increment(1);

        tracing::info!(appointment_id = %id, "Appointment booked directly");
        Ok(BookingOutcome {
            appointment_details: AppointmentDetails {
                id: Some(id.clone()),
                ..details.clone()
            },
            id,
            appointment_time: instant,
        })
    }

    pub async fn reschedule_appointment(
        &self,
        details: &AppointmentDetails,
    ) -> Result<BookingOutcome> {
        let id = details
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::MissingParameters("Id".to_string()))?
            .to_string();
        let instant = checked_instant(details)?;

        self.crm
            .appointments
            .update(&id, &AppointmentData::reschedule(details, instant.clone()))
            .await?;
        metrics::counter!(
            "bankbot_crm_writes_total",
            "kind" => AppointmentAction::Reschedule.as_str()
        )
        .increment(1);

        tracing::info!(appointment_id = %id, time = %instant, "Appointment rescheduled directly");
        Ok(BookingOutcome {
            appointment_details: details.clone(),
            id,
            appointment_time: instant,
        })
    }

    pub async fn banker_notes(&self) -> Result<Vec<BankerNote>> {
        Ok(self.crm.visits.banker_notes(self.tenant.contact_id()).await?)
    }

    pub async fn visit_history(&self, limit: Option<usize>) -> Result<Vec<VisitRecord>> {
        Ok(self
            .crm
            .visits
            .visit_history(self.tenant.contact_id(), limit.unwrap_or(DEFAULT_VISIT_LIMIT))
            .await?)
    }

    /// Products for the customer: model pick, then keyword match, then the
    /// first catalog entries
    pub async fn recommendations(&self) -> RecommendationsOutcome {
        let contact = self.tenant.contact_id();
        let notes = self.crm.visits.banker_notes(contact).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Banker notes unavailable for recommendations");
            Vec::new()
        });
        let visits = self
            .crm
            .visits
            .visit_history(contact, DEFAULT_VISIT_LIMIT)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Visit history unavailable for recommendations");
                Vec::new()
            });

        let mut lines: Vec<String> = notes.iter().filter_map(BankerNote::describe).collect();
        lines.extend(visits.iter().map(VisitRecord::describe));
        let context = lines.join("\n");

        if !context.is_empty() {
            match self.llm.recommend_products(&context).await {
                Ok(picked) => {
                    let recommendations: Vec<ProductRecommendation> = picked
                        .into_iter()
                        .filter_map(|r| {
                            self.catalog.product(&r.product_id).map(|p| ProductRecommendation {
                                product_id: p.id.clone(),
                                name: p.name.clone(),
                                description: p.description.clone(),
                                reason: r.reason,
                            })
                        })
                        .collect();
                    if !recommendations.is_empty() {
                        return RecommendationsOutcome {
                            recommendations,
                            source: RecommendationSource::Model,
                        };
                    }
                }
                Err(e) => tracing::debug!(error = %e, "Falling back to keyword recommendations"),
            }

            let matched = self.catalog.match_products(&context);
            if !matched.is_empty() {
                return RecommendationsOutcome {
                    recommendations: matched
                        .into_iter()
                        .take(MAX_RECOMMENDATIONS)
                        .map(|p| ProductRecommendation {
                            product_id: p.id.clone(),
                            name: p.name.clone(),
                            description: p.description.clone(),
                            reason: "Matches topics from your recent visits".to_string(),
                        })
                        .collect(),
                    source: RecommendationSource::Keywords,
                };
            }
        }

        RecommendationsOutcome {
            recommendations: self
                .catalog
                .products
                .iter()
                .take(MAX_RECOMMENDATIONS)
                .map(|p| ProductRecommendation {
                    product_id: p.id.clone(),
                    name: p.name.clone(),
                    description: p.description.clone(),
                    reason: "Popular with our customers".to_string(),
                })
                .collect(),
            source: RecommendationSource::Default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_instant() {
        let mut details = AppointmentDetails {
            reason: Some("Loan".to_string()),
            date: Some("2025-03-06".to_string()),
            time: Some("3:00 PM".to_string()),
            location: Some("Downtown".to_string()),
            ..Default::default()
        };
        assert_eq!(checked_instant(&details).unwrap(), "2025-03-06T15:00:00.000Z");

        details.time = Some("25:00".to_string());
        assert_eq!(checked_instant(&details).unwrap_err().code(), "INVALID_DATETIME");

        details.location = None;
        assert_eq!(checked_instant(&details).unwrap_err().code(), "MISSING_PARAMETERS");
    }
}
