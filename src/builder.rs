use regex::Regex;

/// Block comments (closed or running to the end), quoted literals (closed
/// or running to the end) and `?` markers, in priority order.
const MARKERS: &str = r#"(?s)/\*.*?\*/|/\*.*|'(?:[^']|'')*'|'.*|"(?:[^"]|"")*"|".*|\?"#;

/// Expands the `index`-th `?` marker (1-based) of already rewritten SQL
/// into `count` comma-separated markers, for binding an IN-clause array.
///
/// Markers inside comments and quoted literals are not counted. A comment
/// that is never closed hides every marker after it, in which case the
/// SQL is returned unchanged.
///
/// # Examples
///
/// ```
/// use sqlx_query_mapper::builder::replace_in;
///
/// let sql = replace_in("SELECT * FROM test WHERE a = ? AND b IN (?)", 2, 3)?;
/// assert_eq!(sql, "SELECT * FROM test WHERE a = ? AND b IN (?,?,?)");
/// # Ok::<(), sqlx_query_mapper::Error>(())
/// ```
pub fn replace_in(sql: &str, index: usize, count: usize) -> crate::Result<String> {
    replace_in_with(sql, index, count, ",")
}

/// Like [`replace_in`], joining the markers with `separator`.
pub fn replace_in_with(
    sql: &str,
    index: usize,
    count: usize,
    separator: &str,
) -> crate::Result<String> {
    let regex = Regex::new(MARKERS)?;
    let marker = regex
        .find_iter(sql)
        .filter(|m| m.as_str() == "?")
        .nth(index.wrapping_sub(1));

    let Some(marker) = marker else {
        return Ok(sql.to_owned());
    };

    let run = vec!["?"; count].join(separator);
    let mut replaced = String::with_capacity(sql.len() + run.len());
    replaced.push_str(&sql[..marker.start()]);
    replaced.push_str(&run);
    replaced.push_str(&sql[marker.end()..]);
    Ok(replaced)
}
