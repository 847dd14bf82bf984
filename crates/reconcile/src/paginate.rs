/// Fetch every page of a page-numbered listing, starting at page 1 and
/// stopping at the first page shorter than `limit`.
pub fn fetch_all<T, E>(limit: u32, mut fetch: impl FnMut(u32, u32) -> Result<Vec<T>, E>) -> Result<Vec<T>, E> {
    let limit = limit.max(1);
    let mut items = Vec::new();
    let mut page = 1;
    loop {
        let batch = fetch(page, limit)?;
        let full = batch.len() >= limit as usize;
        items.extend(batch);
        if !full {
            return Ok(items);
        }
        page += 1;
    }
}
