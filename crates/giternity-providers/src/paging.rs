use reqwest::header::HeaderMap;

/// Page number of the `rel="next"` entry of a `Link` header.
pub(crate) fn next_page_from_link_header(headers: &HeaderMap) -> Option<u32> {
    let link = headers.get("link")?.to_str().ok()?;
    for part in link.split(',') {
        let part = part.trim();
        if !part.contains("rel=\"next\"") {
            continue;
        }
        let start = part.find('<')? + 1;
        let end = part.find('>')?;
        let url = part.get(start..end)?;
        for pair in url.split('?').nth(1).unwrap_or("").split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if key == "page"
                && let Ok(page) = value.parse::<u32>()
            {
                return Some(page);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn parses_next_page_and_ignores_per_page() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "link",
            HeaderValue::from_static(
                "<https://api.github.com/users/acme/repos?per_page=100&page=1>; rel=\"prev\", \
                 <https://api.github.com/users/acme/repos?per_page=100&page=3>; rel=\"next\", \
                 <https://api.github.com/users/acme/repos?per_page=100&page=9>; rel=\"last\"",
            ),
        );
        assert_eq!(next_page_from_link_header(&headers), Some(3));
    }

    #[test]
    fn last_page_has_no_next() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "link",
            HeaderValue::from_static(
                "<https://api.github.com/users/acme/repos?per_page=100&page=1>; rel=\"first\"",
            ),
        );
        assert_eq!(next_page_from_link_header(&headers), None);
        assert_eq!(next_page_from_link_header(&HeaderMap::new()), None);
    }

    #[test]
    fn malformed_link_header_has_no_next() {
        for raw in [
            "><https://api.github.com/x?page=2; rel=\"next\"",
            ">x<; rel=\"next\"",
            "rel=\"next\"",
        ] {
            let mut headers = HeaderMap::new();
            headers.insert("link", HeaderValue::from_str(raw).unwrap());
            assert_eq!(next_page_from_link_header(&headers), None, "{raw}");
        }
    }
}
