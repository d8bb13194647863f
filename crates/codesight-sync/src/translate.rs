//! Mapping analysis responses onto per-file findings

use codesight_network::{AnalysisResponse, AnalysisStatus, MarkerRange, SuggestionDefinition};
use codesight_types::{
    ContentProvider, Error, FileHandle, Result, Severity, Suggestion, SuggestionMap, TextRange,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Converts row/column ranges of a finished analysis into character offsets
pub struct ResponseTranslator {
    content: Arc<dyn ContentProvider>,
}

impl ResponseTranslator {
    /// Create a translator resolving line offsets through `content`
    pub fn new(content: Arc<dyn ContentProvider>) -> Self {
        Self { content }
    }

    /// Findings for each requested file.
    ///
    /// Returns an empty map unless the analysis is `DONE` and well formed. A
    /// requested file the service has no findings for maps to an empty list.
    pub fn translate(&self, files: &[FileHandle], response: &AnalysisResponse) -> SuggestionMap {
        if response.status != AnalysisStatus::Done {
            debug!(status = %response.status, "Analysis not done, nothing to translate");
            return SuggestionMap::new();
        }

        match self.try_translate(files, response) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, files = files.len(), "Discarding malformed analysis response");
                SuggestionMap::new()
            }
        }
    }

    fn try_translate(&self, files: &[FileHandle], response: &AnalysisResponse) -> Result<SuggestionMap> {
        let results = response
            .analysis_results
            .as_ref()
            .ok_or_else(|| Error::protocol("analysis results missing"))?;
        let definitions = results
            .suggestions
            .as_ref()
            .ok_or_else(|| Error::protocol("suggestions table missing"))?;

        let mut translated = SuggestionMap::with_capacity(files.len());
        for file in files {
            let suggestions = match results.files.get(file.path()) {
                Some(by_index) => self.file_suggestions(file, by_index, definitions)?,
                None => Vec::new(),
            };
            translated.insert(file.clone(), suggestions);
        }
        Ok(translated)
    }

    fn file_suggestions(
        &self,
        file: &FileHandle,
        by_index: &BTreeMap<String, Vec<MarkerRange>>,
        definitions: &BTreeMap<String, SuggestionDefinition>,
    ) -> Result<Vec<Suggestion>> {
        let mut suggestions = Vec::with_capacity(by_index.len());

        for (index, markers) in by_index {
            let definition = definitions
                .get(index)
                .ok_or_else(|| Error::protocol(format!("no suggestion with index {}", index)))?;
            let severity = Severity::from_level(definition.severity).ok_or_else(|| {
                Error::protocol(format!(
                    "suggestion {} has severity {}",
                    definition.id, definition.severity
                ))
            })?;

            let ranges = markers
                .iter()
                .filter_map(|marker| {
                    let range = self.offsets(file, marker);
                    if range.is_none() {
                        debug!(%file, rows = ?marker.rows, cols = ?marker.cols, "Range outside the current text");
                    }
                    range
                })
                .collect();

            suggestions.push(Suggestion::new(
                definition.id.clone(),
                definition.message.clone(),
                severity,
                ranges,
            ));
        }

        Ok(suggestions)
    }

    /// `start = line(startRow - 1) + startCol - 1`, `end = line(endRow - 1) + endCol`
    fn offsets(&self, file: &FileHandle, marker: &MarkerRange) -> Option<TextRange> {
        let [start_row, end_row] = marker.rows;
        let [start_col, end_col] = marker.cols;

        let start_line = self.content.line_start_offset(file, start_row.checked_sub(1)?)?;
        let end_line = self.content.line_start_offset(file, end_row.checked_sub(1)?)?;

        Some(TextRange::new(
            start_line + start_col.checked_sub(1)?,
            end_line + end_col,
        ))
    }
}

impl std::fmt::Debug for ResponseTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseTranslator").finish_non_exhaustive()
    }
}
