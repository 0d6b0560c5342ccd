pub const SUMMARY_PROMPT: &str = "Please provide a concise summary of the document.";

pub const STRUCTURED_KEYWORDS_PROMPT: &str = r#"Extract the most important keywords and key concepts from the document. Return ONLY a raw JSON array of objects with keywords and definitions. Each object must have exactly two fields: 'keyword' and 'definition'. The response must start with '[' and end with ']'. Do not include any other text, explanations, or formatting. Example of valid response: [{"keyword":"artificial intelligence","definition":"The simulation of human intelligence by machines"},{"keyword":"neural networks","definition":"Computing systems inspired by biological neural networks"}]"#;

pub const DEFAULT_EXPLAIN_STYLE: &str = "explain this to me as if i were 12 years old";

pub fn build_flat_keywords_prompt(delimiter: char) -> String {
    format!(
        "Extract the most important keywords and key concepts from the document. \
Return ONLY the keywords separated by '{}', with no numbering, explanations, or other text.",
        delimiter
    )
}

pub const GRAPH_PROMPT: &str = r#"Create a detailed hierarchical mind map of the document's main concepts and their relationships. Follow these steps:

1. First, identify the main topic of the document - this will be the central node
2. Then, identify 4-6 key subtopics that branch directly from the main topic
3. For each subtopic, identify 3-4 specific concepts, details, or examples
4. Add 1-2 related points for each specific concept where relevant

Format the response as a JSON object exactly like this:
{
  "nodes": [
    { "id": "1", "name": "Main Topic", "val": 20 },
    { "id": "2", "name": "Key Subtopic 1", "val": 15 },
    { "id": "3", "name": "Specific Concept 1.1", "val": 12 },
    { "id": "4", "name": "Related Point 1.1.1", "val": 10 }
  ],
  "links": [
    { "source": "1", "target": "2" },
    { "source": "2", "target": "3" },
    { "source": "3", "target": "4" }
  ]
}

Requirements:
1. Use actual concepts from the document
2. Keep node names concise (max 4-5 words)
3. Use the following node sizes:
   - Main topic: val = 20
   - Key subtopics: val = 15
   - Specific concepts: val = 12
   - Related points: val = 10
4. Include at least 15-20 nodes total
5. Ensure all nodes are connected via links
6. Return ONLY the JSON object with no additional text"#;

pub fn build_explain_prompt(selection: &str, style: Option<&str>) -> String {
    let style = style
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_EXPLAIN_STYLE);

    format!(
        "Please focus only on explaining this specific text: \"{}\". {}",
        selection, style
    )
}
