use serde::{Deserialize, Serialize};

pub mod biddtos;
pub mod jobdtos;
pub mod messagedtos;
pub mod paymentdtos;
pub mod userdtos;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(message: &str, data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            data,
        }
    }
}

/// Collects validator errors into one readable message.
pub fn validation_message(errors: &validator::ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(message) => message.to_string(),
                None => format!("{} is invalid", field),
            })
        })
        .collect();
    messages.sort();
    messages.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Draft {
        #[validate(length(min = 1, message = "Title is required"))]
        title: String,
        #[validate(range(min = 1))]
        quantity: i32,
    }

    #[test]
    fn validation_message_lists_every_field() {
        let err = Draft { title: String::new(), quantity: 0 }.validate().unwrap_err();
        let message = validation_message(&err);
        assert!(message.contains("Title is required"));
        assert!(message.contains("quantity is invalid"));
    }

    #[test]
    fn envelope_shape() {
        let json = serde_json::to_value(ApiResponse::success("ok", 5)).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["data"], 5);
    }
}
