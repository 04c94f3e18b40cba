use serde_json::{json, Value};

pub const ANALYSIS_SCHEMA_NAME: &str = "resume_analysis";

pub const ANALYSIS_SYSTEM_PROMPT: &str = "\
    You are an expert technical recruiter and resume optimizer who knows ATS parsing behavior \
    across major systems (Workday, Greenhouse, Lever, iCIMS, Taleo). You will:\n\
    1) Score the resume against the job (if provided) across keyword match, seniority fit, core \
    skills, domain experience, location, education, and resume clarity, from 0 to 100.\n\
    2) Extract missing but critical keywords from the job and suggest precise resume edits.\n\
    3) Suggest 3-5 quantified bullet rewrites using strong impact verbs tailored to the target role.\n\
    4) Provide an ATS-readability audit (sections, formatting, parse risks). Keep it concise and actionable.\n\
    5) Provide a short cover letter scaffold (5-7 sentences) that mirrors keywords without fluff.\n\
    If no job description is provided, score general resume quality and fill generalGuidance \
    with role-agnostic advice; otherwise set generalGuidance to an empty string. \
    Use message for a one-sentence summary. Respond with JSON only.";

/// Strict structured-output schema for one analysis.
pub fn analysis_schema() -> Value {
    let strings = json!({ "type": "array", "items": { "type": "string" } });
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "score": { "type": "number", "minimum": 0, "maximum": 100 },
            "highlights": strings,
            "missingKeywords": strings,
            "rewriteBullets": strings,
            "atsAudit": { "type": "string" },
            "coverLetterTemplate": { "type": "string" },
            "generalGuidance": { "type": "string" },
            "message": { "type": "string" }
        },
        "required": [
            "score",
            "highlights",
            "missingKeywords",
            "rewriteBullets",
            "atsAudit",
            "coverLetterTemplate",
            "generalGuidance",
            "message"
        ]
    })
}
