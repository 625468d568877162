//! Per-language script bundles.
//!
//! A bundle is the setup code run once on a kernel plus the four command
//! templates used to query and mutate its variables. The snippet bodies are
//! opaque data shipped under `scripts/`.

use serde::Serialize;

use crate::error::InspectorError;

const PYTHON_INIT: &str = include_str!("../../scripts/python.py");
const R_INIT: &str = include_str!("../../scripts/r.R");

/// Setup code and command templates for one kernel language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScriptBundle {
    /// Source run silently once per kernel (and again after restarts).
    #[serde(skip)]
    pub init_script: &'static str,
    /// Expression whose result is the JSON variable list.
    pub query_command: &'static str,
    /// Function called as `cmd(name, max_rows)` to fetch a table.
    pub matrix_query_command: &'static str,
    /// Function called as `cmd(name)` to display a widget.
    pub widget_query_command: &'static str,
    /// Function called as `cmd('name')` to delete a variable.
    pub delete_command: &'static str,
}

impl ScriptBundle {
    /// Source of a matrix query for `name`.
    #[must_use]
    pub fn matrix_query(&self, name: &str, max_rows: usize) -> String {
        format!("{}({name}, {max_rows})", self.matrix_query_command)
    }

    /// Source of a widget query for `name`.
    #[must_use]
    pub fn widget_query(&self, name: &str) -> String {
        format!("{}({name})", self.widget_query_command)
    }

    /// Source deleting `name`.
    #[must_use]
    pub fn delete(&self, name: &str) -> String {
        format!("{}('{name}')", self.delete_command)
    }
}

const PYTHON: ScriptBundle = ScriptBundle {
    init_script: PYTHON_INIT,
    query_command: "_variable_inspector_dict_list()",
    matrix_query_command: "_variable_inspector_getmatrixcontent",
    widget_query_command: "_variable_inspector_displaywidget",
    delete_command: "_variable_inspector_deletevariable",
};

const R: ScriptBundle = ScriptBundle {
    init_script: R_INIT,
    query_command: ".ls.objects()",
    matrix_query_command: ".ls.objects",
    widget_query_command: ".displayWidget",
    delete_command: ".deleteVariable",
};

/// Language identifiers and their bundles, matched exactly.
static SCRIPTS: [(&str, ScriptBundle); 4] = [
    ("python3", PYTHON),
    ("python2", PYTHON),
    ("python", PYTHON),
    ("R", R),
];

/// Looks up the bundle for `language`. Case-sensitive, no normalisation.
///
/// # Errors
///
/// Returns [`InspectorError::UnsupportedLanguage`] when no bundle exists;
/// callers fall back to the no-op handler.
pub fn get_script(language: &str) -> Result<&'static ScriptBundle, InspectorError> {
    SCRIPTS
        .iter()
        .find(|(lang, _)| *lang == language)
        .map(|(_, bundle)| bundle)
        .ok_or_else(|| InspectorError::UnsupportedLanguage(language.to_string()))
}

/// Every language identifier with a bundle.
#[must_use]
pub fn supported_languages() -> Vec<&'static str> {
    SCRIPTS.iter().map(|(lang, _)| *lang).collect()
}
