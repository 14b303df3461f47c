//! Built-in automation step types

use crate::registry::{FieldSpec, StepTypeDefinition, START_CATEGORY};

pub fn builtin_catalog() -> Vec<StepTypeDefinition> {
    vec![
        // Start
        StepTypeDefinition::new("open_page", "Open web page", START_CATEGORY)
            .with_description("Opens a URL in the default browser.")
            .with_field(FieldSpec::url("url", "URL").required().with_placeholder("https://...")),
        StepTypeDefinition::new("change_page", "Change web page", START_CATEGORY)
            .with_description("Navigates the active tab to another URL.")
            .with_field(
                FieldSpec::url("url", "New URL")
                    .required()
                    .with_placeholder("https://..."),
            ),
        StepTypeDefinition::new("open_document", "Open document", START_CATEGORY)
            .with_description("Opens a local file (doc, txt, pdf).")
            .with_field(
                FieldSpec::text("path", "File path")
                    .required()
                    .with_placeholder("C:\\path\\file.pdf"),
            ),
        StepTypeDefinition::new("start_app", "Start application", START_CATEGORY)
            .with_description("Launches an application.")
            .with_field(
                FieldSpec::text("executable", "Executable path")
                    .required()
                    .with_placeholder("C:\\Program Files\\app\\app.exe"),
            )
            .with_field(FieldSpec::text("args", "Arguments").with_placeholder("--safe-mode")),
        // Process
        StepTypeDefinition::new("maximize_app", "Maximize application", "process")
            .with_description("Maximizes the target application window.")
            .with_field(FieldSpec::text("title", "Window title").with_placeholder("Window name")),
        StepTypeDefinition::new("click", "Click", "process")
            .with_description("Clicks a point or an element.")
            .with_field(
                FieldSpec::text("selector", "Selector / element")
                    .with_placeholder("#submit / XPath / text"),
            )
            .with_field(FieldSpec::number("x", "X (px)").with_placeholder("100"))
            .with_field(FieldSpec::number("y", "Y (px)").with_placeholder("200"))
            .with_field(
                FieldSpec::select("button", "Button", ["left", "right", "double"])
                    .required(),
            ),
        StepTypeDefinition::new("type_text", "Type text / keys", "process")
            .with_description("Types text or sends a key combination.")
            .with_field(FieldSpec::select("mode", "Mode", ["text", "hotkeys"]).required())
            .with_field(
                FieldSpec::text("content", "Text or hotkeys")
                    .required()
                    .with_placeholder("Hello world / CTRL+V"),
            ),
        StepTypeDefinition::new("copy_paste", "Copy and paste", "process")
            .with_description("Copies and pastes between applications.")
            .with_field(FieldSpec::text("source", "Source (selector/window)"))
            .with_field(FieldSpec::text("target", "Target (selector/window)")),
        StepTypeDefinition::new("sort_data", "Sort data", "process")
            .with_description("Sorts data by a criterion.")
            .with_field(
                FieldSpec::select("order", "Order", ["asc", "desc", "alphabetic", "numeric"])
                    .required(),
            )
            .with_field(FieldSpec::text("column", "Column / field")),
        // Close
        StepTypeDefinition::new("close_browser", "Close browser", "close")
            .with_description("Closes the browser or a specific URL.")
            .with_field(FieldSpec::url("url", "Specific URL")),
        StepTypeDefinition::new("close_document", "Close document", "close")
            .with_description("Closes the file in use.")
            .with_field(FieldSpec::select("force", "Force close", ["no", "yes"]).required()),
        StepTypeDefinition::new("close_app", "Close application", "close")
            .with_description("Closes the target application.")
            .with_field(FieldSpec::text("title", "Window title")),
        // Basic
        StepTypeDefinition::new("export_flow", "Export flow", "basic")
            .with_description("Exports the current flow."),
        StepTypeDefinition::new("run_flow", "Run flow", "basic")
            .with_description("Runs the generated flow."),
        StepTypeDefinition::new("finish_all", "Finish (close everything)", "basic")
            .with_description("Finishes and releases resources."),
        // Read
        StepTypeDefinition::new("read_csv", "Read CSV", "read")
            .with_description("Reads a CSV file.")
            .with_field(
                FieldSpec::text("path", "CSV path")
                    .required()
                    .with_placeholder("C:\\path\\data.csv"),
            ),
        StepTypeDefinition::new("read_excel", "Read Excel", "read")
            .with_description("Reads an Excel workbook.")
            .with_field(
                FieldSpec::text("path", "Excel path")
                    .required()
                    .with_placeholder("C:\\path\\data.xlsx"),
            )
            .with_field(
                FieldSpec::text("sheet", "Sheet name")
                    .required()
                    .with_placeholder("Sheet1"),
            ),
        StepTypeDefinition::new("read_txt", "Read TXT", "read")
            .with_description("Reads a delimited text file.")
            .with_field(
                FieldSpec::text("path", "TXT path")
                    .required()
                    .with_placeholder("C:\\path\\data.txt"),
            )
            .with_field(
                FieldSpec::text("delimiter", "Delimiter")
                    .required()
                    .with_placeholder(", ; - | \\t"),
            ),
        // Write
        StepTypeDefinition::new("write_csv", "Write CSV", "write")
            .with_description("Writes an array variable to CSV.")
            .with_field(
                FieldSpec::text("variable", "Variable / array")
                    .required()
                    .with_placeholder("my_array"),
            )
            .with_field(
                FieldSpec::text("path", "Output path")
                    .required()
                    .with_placeholder("C:\\path\\out.csv"),
            ),
        StepTypeDefinition::new("write_excel", "Write Excel", "write")
            .with_description("Writes an array variable to Excel.")
            .with_field(
                FieldSpec::text("variable", "Variable / array")
                    .required()
                    .with_placeholder("my_array"),
            )
            .with_field(
                FieldSpec::text("path", "Output path")
                    .required()
                    .with_placeholder("C:\\path\\out.xlsx"),
            ),
        StepTypeDefinition::new("write_txt", "Write TXT", "write")
            .with_description("Writes an array variable to a delimited text file.")
            .with_field(
                FieldSpec::text("variable", "Variable / array")
                    .required()
                    .with_placeholder("my_array"),
            )
            .with_field(
                FieldSpec::text("path", "Output path")
                    .required()
                    .with_placeholder("C:\\path\\out.txt"),
            )
            .with_field(
                FieldSpec::text("delimiter", "Delimiter")
                    .required()
                    .with_placeholder(", ; - | \\t"),
            ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique() {
        let catalog = builtin_catalog();
        let ids: HashSet<_> = catalog.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids.len(), catalog.len());
    }

    #[test]
    fn select_fields_have_options() {
        for def in builtin_catalog() {
            for field in &def.property_schema {
                if field.field_type == crate::FieldType::Select {
                    assert!(
                        field.options.as_ref().is_some_and(|o| !o.is_empty()),
                        "{}.{} has no options",
                        def.id,
                        field.key
                    );
                }
            }
        }
    }
}
