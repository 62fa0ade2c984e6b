//! Prompt construction for query formulation and estimation synthesis.

use crate::{
    estimate::types::TASK_COLUMNS,
    rates::RateTable,
    search::{SearchDocument, SearchHit},
    vocabulary::{Field, Revision, VOCABULARY},
};
use serde::Serialize;
use std::fmt::Write as _;

/// Token budget for query formulation.
pub const QUERY_MAX_TOKENS: u32 = 150;
/// Sampling temperature for query formulation.
pub const QUERY_TEMPERATURE: f32 = 0.7;
/// Token budget for estimation synthesis.
pub const ESTIMATION_MAX_TOKENS: u32 = 1500;
/// Sampling temperature for estimation synthesis.
pub const ESTIMATION_TEMPERATURE: f32 = 0.1;

/// Estimation prompt together with the audit rendering of the records it embeds.
#[derive(Debug, Clone, Serialize)]
pub struct EstimationPrompt {
    /// Full instruction text sent to the model.
    pub prompt: String,
    /// Pretty-printed JSON array of the retrieved records.
    pub audit_json: String,
}

/// Prompt asking for one concise search query. Absent inputs render as empty sections.
pub fn query_prompt(document_text: Option<&str>, requirements: Option<&str>) -> String {
    format!(
        "Context:\n\
         You are helping to create a project timeline. The user has provided a PDF document \
         with project details and additional requirements.\n\
         \n\
         PDF Content:\n\
         {document}\n\
         \n\
         Additional User Requirements:\n\
         {requirements}\n\
         \n\
         Instructions:\n\
         - Write a query to search for tasks relevant to the described project.\n\
         - The query should focus on finding tasks with clear roles, responsibilities, or \
         descriptions relevant to the project.\n\
         - Consider both the PDF content and additional requirements when forming the query.\n\
         - Aim for tasks that are high-priority or foundational to the type of project described.\n\
         - Keep the query concise but descriptive enough to retrieve meaningful results.\n\
         \n\
         Query:\n",
        document = document_text.unwrap_or_default(),
        requirements = requirements.unwrap_or_default(),
    )
}

/// Human-readable block for one retrieved record.
pub fn describe_document(document: &SearchDocument) -> String {
    format!(
        "MSCW: {}\nArea: {}\nModule: {}\nFeature: {}\nTask: {}\nProfile: {}\n\
         MinDays: {}\nRealDays: {}\nMaxDays: {}\n% Contingency: {}\n\
         EstimatedDays: {}\nEstimatedPrice: {}\nPotential Issues: {}",
        document.mscw,
        document.area,
        document.module,
        document.feature,
        document.task,
        document.profile,
        document.min_days,
        document.real_days,
        document.max_days,
        document.contingency,
        document.estimated_days,
        crate::sanitize::format_number(document.estimated_price),
        document.potential_issues,
    )
}

/// Pretty JSON array of the hits, as shown next to the estimate.
pub fn audit_json(hits: &[SearchHit]) -> String {
    serde_json::to_string_pretty(hits).unwrap_or_else(|_| "[]".to_string())
}

/// Assemble the estimation prompt for the active revision.
pub fn estimation_prompt(
    requirements: Option<&str>,
    document_text: Option<&str>,
    hits: &[SearchHit],
    rates: &RateTable,
    revision: Revision,
) -> EstimationPrompt {
    let records = hits
        .iter()
        .map(|hit| describe_document(&hit.document))
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut prompt = String::new();
    let _ = writeln!(prompt, "Context:");
    let _ = writeln!(prompt, "The user has described their project as follows:");
    let _ = writeln!(prompt, "{}", requirements.unwrap_or_default());
    if let Some(text) = document_text.filter(|text| !text.trim().is_empty()) {
        let _ = writeln!(prompt, "\nThe project document contains:\n{text}");
    }
    let _ = writeln!(
        prompt,
        "\nThe following tasks were retrieved based on the user's project description:\n{records}"
    );

    prompt.push_str(
        "\nInstructions:\n\
         - Create a detailed project estimation from the user prompt using these tasks. \
         Do not blindly copy the tasks but use them as a guideline to create the new estimated tasks.\n\
         - For each task:\n\
         \x20   - Provide a clear timeline (in days) for its completion.\n\
         \x20   - Identify any risks, delays, or dependencies that could impact the task.\n\
         \x20   - Include the task's estimated price (based on the Profile and EstimatedDays).\n\
         - Present the estimation as JSON in the format given below.\n",
    );

    prompt.push_str(
        "\nGeneral pointers:\n\
         - Keep the estimated days low. Anywhere from 0 for MinDays to 4 days for MaxDays is a good estimate.\n\
         - Think about how many tasks there need to be. Don't just copy the amount of retrieved tasks.\n\
         - Make sure that the \"Task\" description contains relevant information from the requirements of the user prompt.\n\
         - Do not use the same Area for every task. Distribute the tasks across different Areas.\n\
         - Use a wide variety of Profiles. Don't use the same Profile for every task.\n\
         - Distribute the MSCW priorities in a 2:1:1 ratio of Must Have to Should Have to Could Have.\n\
         - Order the tasks as Must Have, then Should Have, then Could Have.\n\
         - Not every task needs \"Potential Issues\". Only assign them when the risk is likely.\n\
         - Ignore the \"Offshore\" roles.\n",
    );
    if rates.is_empty() {
        prompt.push_str(
            "- No rate table is available. Reuse the Profiles of the retrieved tasks.\n",
        );
    } else {
        let _ = writeln!(
            prompt,
            "- Each Profile has a daily rate that must be used to calculate the EstimatedPrice. \
             These rates are authoritative and must not be changed: {}",
            rates.to_prompt_json()
        );
    }

    let _ = writeln!(
        prompt,
        "\nDescription:\n\
         1. **MSCW**: The priority of the task. The options are: {priorities}\n\
         2. **Area**: The area of the project where the task belongs. The options are: {areas}\n\
         3. **Module**: The software engineering domain of the task. The options are: {modules}\n\
         4. **Feature**: What exactly is being done in the task. The options are: {features}\n\
         5. **Task**: Summarize the task in a detailed sentence or two.\n\
         6. **Profile**: The role of the person who will perform the task. The options are the ones defined above with their rates.\n\
         7. **MinDays**: The estimated minimum number of days required to complete the task.\n\
         8. **RealDays**: The most likely number of days required to complete the task.\n\
         9. **MaxDays**: The estimated maximum number of days required to complete the task.\n\
         10. **Contingency**: Write \"0\" for now.\n\
         11. **EstimatedDays**: {days_rule}\n\
         12. **EstimatedPrice**: EstimatedDays multiplied by the daily rate of the Profile. \
         When EstimatedDays is 0, use half of the daily rate of the Profile.\n\
         13. **Potential Issues**: List potential risks or issues that might arise, such as \
         \"security concerns\", \"data compliance requirements\" or \"scope changes\".",
        priorities = VOCABULARY.quoted(Field::Priority),
        areas = VOCABULARY.quoted(Field::Area),
        modules = VOCABULARY.quoted(Field::Module),
        features = VOCABULARY.quoted(Field::Feature),
        days_rule = days_rule(revision),
    );

    let _ = write!(
        prompt,
        "\nReturn your response in the following JSON format:\n{}",
        response_template(revision)
    );

    EstimationPrompt {
        prompt,
        audit_json: audit_json(hits),
    }
}

fn days_rule(revision: Revision) -> &'static str {
    match revision {
        Revision::Weighted => {
            "Calculate (MinDays + 4 * RealDays + 4 * MaxDays) / 9 and round the result up to a whole number."
        }
        Revision::Bounded => {
            "Choose a value between MinDays and MaxDays, inclusive; 0 is allowed. \
             Round it down when it is higher than RealDays, otherwise round it up."
        }
    }
}

fn response_template(revision: Revision) -> String {
    let summary = match revision {
        Revision::Weighted => "The sum of the EstimatedPrice",
        Revision::Bounded => "The sum of the EstimatedDays",
    };
    let hints = [
        "Must Have / Should Have / Could Have",
        "Area of work",
        "Module category",
        "Feature of the task",
        "Task description",
        "Profile needed for the task",
        "Minimum estimated days for the task",
        "Most likely days for the task",
        "Maximum estimated days for the task",
        "Contingency percentage for the task",
        "Estimated duration for the task",
        "Estimated price for the task",
        "Any potential risks or issues impacting the task",
    ];

    let mut template = String::from("{\n");
    let _ = writeln!(
        template,
        "    \"{}\": \"{summary}\",",
        revision.summary_field()
    );
    template.push_str("    \"tasks\": [\n        {\n");
    let fields = TASK_COLUMNS
        .iter()
        .zip(hints)
        .map(|(column, hint)| format!("            \"{column}\": \"{hint}\""))
        .collect::<Vec<_>>()
        .join(",\n");
    template.push_str(&fields);
    template.push_str("\n        },\n        ...\n    ]\n}\n");
    template
}
