use std::sync::Arc;

use chrono::Utc;
use clap::Args;
use visa_tracker::config::NotificationConfig;
use visa_tracker::error::AppError;
use visa_tracker::workflows::visa::{
    aggregate, customer_bucket, NotificationDispatcher, StatusValue, TrackingId,
    TrackingProjector, TrackingView, VisaArtifact, VisaStatusService,
};

use crate::infra::{sample_document, InMemoryApplicationStore, LoggingMailTransport};

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Number of travellers in the sample family application.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=4))]
    pub(crate) travellers: u8,
    /// Print the full body of every e-mail that would be sent.
    #[arg(long)]
    pub(crate) show_mail: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let store = Arc::new(InMemoryApplicationStore::default());
    let transport = LoggingMailTransport::default();
    let service = VisaStatusService::new(store.clone());
    let dispatcher =
        NotificationDispatcher::new(Arc::new(transport.clone()), NotificationConfig::default());

    println!("Visa tracker demo");

    let id = TrackingId::from("VT-DEMO-ISSUE");
    let statuses = vec![StatusValue::Paid; usize::from(args.travellers)];
    store.seed(id.clone(), sample_document(&id, &statuses));
    println!("\nIssuing one visa in a paid family of {}", args.travellers);
    print_view(&TrackingProjector::project(&service.get(&id)?));

    let issuance = service.issue_visa(
        &id,
        0,
        VisaArtifact {
            name: "amara-evisa.pdf".to_string(),
            url: "https://files.visa-tracker.local/VT-DEMO-ISSUE/amara-evisa.pdf".to_string(),
            path: "visas/VT-DEMO-ISSUE/amara-evisa.pdf".to_string(),
            size: 48_213,
            uploaded_at: Some(Utc::now()),
        },
    )?;
    let outcome = dispatcher.dispatch(&issuance.notification);
    println!(
        "  applicant 1: {} -> issued, overall now {} (notification {})",
        issuance.previous_status,
        issuance.application.status,
        if outcome.is_sent() { "sent" } else { "not sent" }
    );
    print_view(&TrackingProjector::project(&service.get(&id)?));

    let id = TrackingId::from("VT-DEMO-REJECT");
    store.seed(
        id.clone(),
        sample_document(&id, &[StatusValue::Issued, StatusValue::Issued]),
    );
    println!("\nRejecting one applicant of an issued pair");
    let transition = service.set_applicant_status(&id, 1, StatusValue::Rejected)?;
    let outcomes = dispatcher.dispatch_all(transition.notification.as_slice());
    println!(
        "  overall now {}, {} notification(s) sent",
        transition.application.status,
        outcomes.iter().filter(|outcome| outcome.is_sent()).count()
    );
    print_view(&TrackingProjector::project(&service.get(&id)?));

    println!("\nEdge cases");
    println!(
        "  no applicants            -> {}",
        aggregate(std::iter::empty::<StatusValue>())
    );
    let mixed = [StatusValue::Processing, StatusValue::Paid];
    println!(
        "  [processing, paid]       -> admin {} / customer {}",
        aggregate(mixed),
        customer_bucket(mixed).label()
    );

    let sent = transport.sent();
    println!("\nOutbound e-mail ({} message(s))", sent.len());
    for request in &sent {
        println!("  to {}: {}", request.message.to, request.message.subject);
        if args.show_mail {
            for line in request.message.body.lines() {
                println!("    {line}");
            }
        }
    }

    Ok(())
}

fn print_view(view: &TrackingView) {
    println!("  customer view: {} ({})", view.status.label(), view.headline);
    for (index, row) in view.applicants.iter().enumerate() {
        println!(
            "    {}. {:<16} {:<10} {}",
            index + 1,
            row.name,
            row.status.label(),
            row.document_url.as_deref().unwrap_or("-")
        );
    }
}
