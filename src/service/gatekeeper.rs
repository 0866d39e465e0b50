// service/gatekeeper.rs
// Moderation of job messages and visibility of job attachments.
use std::collections::HashSet;

use ammonia::Builder;

use crate::{
    models::{
        jobmodel::{Attachment, Job, UploadType},
        messagemodel::{Message, MessageKind},
        usermodel::UserRole,
    },
    service::error::ServiceError,
};

/// Text messages go straight through; links and files shared by clients or
/// freelancers wait for an admin.
pub fn initial_approval(sender_role: UserRole, kind: MessageKind) -> bool {
    sender_role.is_admin() || kind == MessageKind::Text
}

pub fn can_see_message(message: &Message, viewer_id: uuid::Uuid, viewer_role: UserRole) -> bool {
    viewer_role.is_admin()
        || message.sender_id == viewer_id
        || message.sender_role.is_admin()
        || message.admin_approved
}

pub fn can_see_attachment(
    attachment: &Attachment,
    job: &Job,
    viewer_id: uuid::Uuid,
    viewer_role: UserRole,
) -> bool {
    match viewer_role {
        UserRole::Admin | UserRole::AccountOwner | UserRole::Freelancer => true,
        UserRole::Client => {
            if attachment.upload_type == UploadType::Final {
                job.payment_confirmed
            } else {
                attachment.uploader_id == viewer_id
            }
        }
    }
}

pub fn visible_messages(
    messages: Vec<Message>,
    viewer_id: uuid::Uuid,
    viewer_role: UserRole,
) -> Vec<Message> {
    messages
        .into_iter()
        .filter(|m| can_see_message(m, viewer_id, viewer_role))
        .collect()
}

pub fn visible_attachments(
    attachments: Vec<Attachment>,
    job: &Job,
    viewer_id: uuid::Uuid,
    viewer_role: UserRole,
) -> Vec<Attachment> {
    attachments
        .into_iter()
        .filter(|a| can_see_attachment(a, job, viewer_id, viewer_role))
        .collect()
}

/// Only admins may create or tag final files.
pub fn check_upload_type(uploader_role: UserRole, upload_type: UploadType) -> Result<(), ServiceError> {
    if upload_type == UploadType::Final && !uploader_role.is_admin() {
        return Err(ServiceError::Forbidden(
            "Only admins can publish final files".to_string(),
        ));
    }
    Ok(())
}

/// Strips every tag from plain text messages, dropping script and style bodies.
pub fn sanitize_text(input: &str) -> String {
    let mut builder = Builder::empty();
    builder.clean_content_tags(HashSet::from(["script", "style"]));
    builder.clean(input).to_string().trim().to_string()
}

pub fn validate_link(input: &str) -> Result<String, ServiceError> {
    let link = input.trim();
    let parsed = reqwest::Url::parse(link)
        .map_err(|_| ServiceError::Validation("Link must be a valid URL".to_string()))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        _ => Err(ServiceError::Validation("Link must use http or https".to_string())),
    }
}

/// Normalizes message content according to its kind.
pub fn prepare_content(kind: MessageKind, content: &str) -> Result<String, ServiceError> {
    let content = match kind {
        MessageKind::Text => sanitize_text(content),
        MessageKind::Link | MessageKind::File => validate_link(content)?,
    };

    if content.is_empty() {
        return Err(ServiceError::Validation("Message content cannot be empty".to_string()));
    }
    Ok(content)
}

/// Whether the assigned freelancer has put any work on the job: an upload or a
/// shared link, approved or not.
pub fn freelancer_has_work(
    freelancer_id: uuid::Uuid,
    attachments: &[Attachment],
    messages: &[Message],
) -> bool {
    attachments.iter().any(|a| a.uploader_id == freelancer_id)
        || messages
            .iter()
            .any(|m| m.sender_id == freelancer_id && m.kind == MessageKind::Link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::jobmodel::JobStatus, service::job_lifecycle::tests::job_in};
    use chrono::Utc;
    use uuid::Uuid;

    fn message(sender_role: UserRole, kind: MessageKind, approved: bool) -> Message {
        Message {
            id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            sender_role,
            kind,
            content: "https://docs.example.com/draft".to_string(),
            admin_approved: approved,
            approved_by: None,
            created_at: Utc::now(),
        }
    }

    fn attachment(uploader_id: Uuid, uploader_role: UserRole, upload_type: UploadType) -> Attachment {
        Attachment {
            id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            uploader_id,
            uploader_role,
            file_name: "draft.docx".to_string(),
            file_url: "https://files.example.com/draft.docx".to_string(),
            upload_type,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn links_from_users_wait_for_admin() {
        assert!(!initial_approval(UserRole::Freelancer, MessageKind::Link));
        assert!(!initial_approval(UserRole::Client, MessageKind::File));
        assert!(initial_approval(UserRole::Client, MessageKind::Text));
        assert!(initial_approval(UserRole::Admin, MessageKind::Link));
    }

    #[test]
    fn pending_link_is_hidden_from_counterparty_only() {
        let msg = message(UserRole::Freelancer, MessageKind::Link, false);
        let client = Uuid::new_v4();
        assert!(!can_see_message(&msg, client, UserRole::Client));
        assert!(can_see_message(&msg, msg.sender_id, UserRole::Freelancer));
        assert!(can_see_message(&msg, Uuid::new_v4(), UserRole::Admin));

        let approved = Message { admin_approved: true, ..msg };
        assert!(can_see_message(&approved, client, UserRole::Client));
    }

    #[test]
    fn admin_messages_are_always_visible() {
        let msg = message(UserRole::AccountOwner, MessageKind::Link, false);
        assert!(can_see_message(&msg, Uuid::new_v4(), UserRole::Client));
    }

    #[test]
    fn final_files_need_payment() {
        let mut job = job_in(JobStatus::Delivered);
        let client = job.client_id;
        let final_file = attachment(Uuid::new_v4(), UserRole::Admin, UploadType::Final);

        assert!(!can_see_attachment(&final_file, &job, client, UserRole::Client));
        job.payment_confirmed = true;
        assert!(can_see_attachment(&final_file, &job, client, UserRole::Client));
    }

    #[test]
    fn clients_only_see_their_own_drafts() {
        let job = job_in(JobStatus::InProgress);
        let client = job.client_id;
        let own = attachment(client, UserRole::Client, UploadType::Initial);
        let draft = attachment(Uuid::new_v4(), UserRole::Freelancer, UploadType::Initial);

        let visible = visible_attachments(vec![own.clone(), draft.clone()], &job, client, UserRole::Client);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, own.id);

        let all = visible_attachments(vec![own, draft], &job, Uuid::new_v4(), UserRole::Freelancer);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn only_admins_publish_final_files() {
        assert!(check_upload_type(UserRole::Freelancer, UploadType::Final).is_err());
        assert!(check_upload_type(UserRole::Freelancer, UploadType::Revision).is_ok());
        assert!(check_upload_type(UserRole::Admin, UploadType::Final).is_ok());
    }

    #[test]
    fn text_is_stripped_of_markup() {
        let clean = sanitize_text("<script>alert(1)</script><b>Hello</b> there");
        assert!(!clean.contains('<'));
        assert!(clean.contains("Hello"));
        assert!(!clean.contains("alert"));
    }

    #[test]
    fn links_must_be_web_urls() {
        assert!(prepare_content(MessageKind::Link, "https://drive.example.com/x").is_ok());
        assert!(prepare_content(MessageKind::Link, "javascript:alert(1)").is_err());
        assert!(prepare_content(MessageKind::Link, "not a url").is_err());
        assert!(prepare_content(MessageKind::Text, "   ").is_err());
    }

    #[test]
    fn work_detection_counts_uploads_and_links() {
        let freelancer = Uuid::new_v4();
        let upload = attachment(freelancer, UserRole::Freelancer, UploadType::Initial);
        let mut link = message(UserRole::Freelancer, MessageKind::Link, false);
        link.sender_id = freelancer;
        let mut text = message(UserRole::Freelancer, MessageKind::Text, true);
        text.sender_id = freelancer;

        assert!(!freelancer_has_work(freelancer, &[], &[]));
        assert!(!freelancer_has_work(freelancer, &[], &[text]));
        assert!(freelancer_has_work(freelancer, &[upload], &[]));
        assert!(freelancer_has_work(freelancer, &[], &[link]));
    }
}
