use crate::error::SqlMapperError;
use crate::mapping::RowBounds;
use crate::results::{CustomDbRow, KeyedRows};

/// Receives query rows one at a time instead of as a list.
pub trait ResultHandler {
    /// # Errors
    /// Any error aborts the query and is returned to the caller.
    fn handle_result(&mut self, context: &mut ResultContext) -> Result<(), SqlMapperError>;
}

/// The current row plus the running count; a handler calls [`stop`](Self::stop) to end the
/// stream early.
#[derive(Debug, Default)]
pub struct ResultContext {
    result_object: Option<CustomDbRow>,
    result_count: usize,
    stopped: bool,
}

impl ResultContext {
    #[must_use]
    pub fn result_object(&self) -> Option<&CustomDbRow> {
        self.result_object.as_ref()
    }

    /// Take ownership of the current row.
    pub fn take_result_object(&mut self) -> Option<CustomDbRow> {
        self.result_object.take()
    }

    /// Rows handed out so far, including the current one.
    #[must_use]
    pub fn result_count(&self) -> usize {
        self.result_count
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn next_result_object(&mut self, row: CustomDbRow) {
        self.result_count += 1;
        self.result_object = Some(row);
    }
}

/// Collects every row into a list.
#[derive(Debug, Default)]
pub struct DefaultResultHandler {
    list: Vec<CustomDbRow>,
}

impl DefaultResultHandler {
    #[must_use]
    pub fn into_result_list(self) -> Vec<CustomDbRow> {
        self.list
    }
}

impl ResultHandler for DefaultResultHandler {
    fn handle_result(&mut self, context: &mut ResultContext) -> Result<(), SqlMapperError> {
        if let Some(row) = context.take_result_object() {
            self.list.push(row);
        }
        Ok(())
    }
}

/// Builds [`KeyedRows`] keyed by one column; a later row replaces an earlier one with an
/// equal key.
#[derive(Debug)]
pub struct MapResultHandler {
    map_key: String,
    mapped_results: KeyedRows,
}

impl MapResultHandler {
    #[must_use]
    pub fn new(map_key: impl Into<String>) -> Self {
        Self {
            map_key: map_key.into(),
            mapped_results: KeyedRows::default(),
        }
    }

    #[must_use]
    pub fn into_mapped_results(self) -> KeyedRows {
        self.mapped_results
    }
}

impl ResultHandler for MapResultHandler {
    fn handle_result(&mut self, context: &mut ResultContext) -> Result<(), SqlMapperError> {
        if let Some(row) = context.take_result_object() {
            let key = row.try_get(&self.map_key)?.clone();
            self.mapped_results.insert(key, row);
        }
        Ok(())
    }
}

/// Skip `row_bounds.offset()` rows, then feed rows to `result_handler` until it stops or
/// `row_bounds.limit()` rows were handed out. Without a handler the rows are returned.
pub(crate) fn handle_rows(
    rows: Vec<CustomDbRow>,
    row_bounds: RowBounds,
    result_handler: Option<&mut (dyn ResultHandler + Send)>,
) -> Result<Vec<CustomDbRow>, SqlMapperError> {
    let mut default_handler = DefaultResultHandler::default();
    let handler: &mut dyn ResultHandler = match result_handler {
        Some(handler) => handler,
        None => &mut default_handler,
    };
    let mut context = ResultContext::default();
    for row in rows.into_iter().skip(row_bounds.offset()) {
        if context.is_stopped() || context.result_count() >= row_bounds.limit() {
            break;
        }
        context.next_result_object(row);
        handler.handle_result(&mut context)?;
    }
    Ok(default_handler.into_result_list())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::types::RowValues;

    fn rows(n: i64) -> Vec<CustomDbRow> {
        let cols = Arc::new(vec!["id".to_string(), "grp".to_string()]);
        (0..n)
            .map(|i| CustomDbRow::new(Arc::clone(&cols), vec![RowValues::Int(i), RowValues::Int(i % 2)]))
            .collect()
    }

    #[test]
    fn bounds_skip_and_limit() {
        let out = handle_rows(rows(10), RowBounds::new(3, 4), None).unwrap();
        let ids: Vec<_> = out.iter().map(|r| *r.get("id").unwrap().as_int().unwrap()).collect();
        assert_eq!(ids, vec![3, 4, 5, 6]);
    }

    struct StopAfter(usize, Vec<i64>);

    impl ResultHandler for StopAfter {
        fn handle_result(&mut self, context: &mut ResultContext) -> Result<(), SqlMapperError> {
            let id = context.result_object().and_then(|r| r.get("id")).and_then(RowValues::as_int);
            self.1.push(*id.unwrap());
            if context.result_count() == self.0 {
                context.stop();
            }
            Ok(())
        }
    }

    #[test]
    fn handler_can_stop_the_stream() {
        let mut handler = StopAfter(2, Vec::new());
        let out = handle_rows(rows(5), RowBounds::DEFAULT, Some(&mut handler)).unwrap();
        assert!(out.is_empty());
        assert_eq!(handler.1, vec![0, 1]);
    }

    #[test]
    fn map_handler_keeps_last_row_per_key() {
        let mut handler = MapResultHandler::new("grp");
        handle_rows(rows(5), RowBounds::DEFAULT, Some(&mut handler)).unwrap();
        let map = handler.into_mapped_results();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&RowValues::Int(0)).unwrap().get("id"), Some(&RowValues::Int(4)));
        assert_eq!(map.get(&RowValues::Int(1)).unwrap().get("id"), Some(&RowValues::Int(3)));
    }

    #[test]
    fn missing_map_key_column_is_reported() {
        let mut handler = MapResultHandler::new("nope");
        let err = handle_rows(rows(1), RowBounds::DEFAULT, Some(&mut handler)).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }
}
