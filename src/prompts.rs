//! Prompt text sent to the classification model.
//!
//! The template is versioned content, not pipeline logic: changing a
//! heuristic here must not require touching the retry or parsing code.
//! Callers can override both strings via
//! [`crate::config::ClassifierConfig::system_instruction`] and
//! [`crate::config::ClassifierConfig::prompt`].

/// System instruction sent with every classification request.
pub const SYSTEM_INSTRUCTION: &str = "You are an AI administrative assistant.";

/// Name of the JSON field carrying the label in the model reply.
pub const LABEL_FIELD: &str = "ContentType";

/// Classification prompt enumerating the six labels and the decision rules.
///
/// The model is asked to reply with a JSON object whose [`LABEL_FIELD`]
/// holds one of the six labels.
pub const CLASSIFICATION_PROMPT: &str = r#"You are an AI administrative assistant that is tasked with changing the file name
in accordance with the content of the file. The current filename may not be accurate so make sure to check the content.

The content type could be one of the following: Rental_Contract, Mortgage_Contract, Contract_Payment,
Teleworking_Agreement, Repayment_Table, Unclassified.

To mark a file as a Rental/Mortgage contract it must contain at least 1 page from said contract.
A file should be classified as a Repayment Table if it almost exclusively contains a Repayment Table.

For more context, if you see a payment being made (whether for rental or mortgage) you need to mark it as Contract Payment.

If the image doesn't seem to encapsulate the above, classify as Unclassified.

So you will put the content type in the value of ContentType.

You will be responding to this message with JSON in the following format:

{
    "ContentType": ""

}

The images will likely contain French/Dutch/English.
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::DocumentLabel;

    #[test]
    fn prompt_lists_every_model_label() {
        for label in DocumentLabel::MODEL_LABELS {
            assert!(
                CLASSIFICATION_PROMPT.contains(label.canonical_name()),
                "prompt is missing {}",
                label.canonical_name()
            );
        }
    }

    #[test]
    fn prompt_names_label_field() {
        assert!(CLASSIFICATION_PROMPT.contains(&format!("\"{LABEL_FIELD}\"")));
    }
}
