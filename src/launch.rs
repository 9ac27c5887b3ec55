use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchRequest {
    /// Read a chapter through the backend proxy.
    Remote { base_url: String, chapter_id: i64 },
    /// Read an already-downloaded chapter from a local directory.
    LocalDir(PathBuf),
}

pub fn parse_launch_request_from_args(args: &[String]) -> Result<Option<LaunchRequest>, String> {
    if args.is_empty() {
        return Ok(None);
    }

    if args.len() == 1 && is_bandview_uri(&args[0]) {
        return parse_bandview_uri(&args[0]).map(Some);
    }

    let mut base_url = None::<String>;
    let mut chapter_id = None::<i64>;
    let mut local_dir = None::<PathBuf>;

    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--server" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "Missing URL after --server.".to_string())?;
                base_url = Some(value.clone());
                index += 2;
            }
            "--chapter" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "Missing id after --chapter.".to_string())?;
                chapter_id = Some(parse_chapter_id(value)?);
                index += 2;
            }
            "--dir" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "Missing path after --dir.".to_string())?;
                local_dir = Some(PathBuf::from(value));
                index += 2;
            }
            other if !other.starts_with("--") && args.len() == 1 => {
                local_dir = Some(PathBuf::from(other));
                index += 1;
            }
            other => {
                return Err(format!("Unrecognized launch argument '{other}'."));
            }
        }
    }

    build_request(base_url, chapter_id, local_dir)
}

pub fn parse_bandview_uri(uri: &str) -> Result<LaunchRequest, String> {
    let rest =
        strip_bandview_scheme(uri).ok_or_else(|| "URL must start with bandview://".to_string())?;

    let (location, query) = split_location_and_query(rest);
    let location = location.trim().trim_matches('/').to_ascii_lowercase();

    let mut base_url = None::<String>;
    let mut chapter_id = None::<i64>;
    let mut local_dir = None::<PathBuf>;

    if let Some(query_string) = query {
        for pair in query_string.split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = key.trim().to_ascii_lowercase();
            let decoded_value = percent_decode(value)?;
            let trimmed = decoded_value.trim();
            match key.as_str() {
                "server" | "proxy" | "base_url" => {
                    if !trimmed.is_empty() {
                        base_url = Some(trimmed.to_string());
                    }
                }
                "chapter" | "chapter_id" | "photo" | "photo_id" => {
                    if !trimmed.is_empty() {
                        chapter_id = Some(parse_chapter_id(trimmed)?);
                    }
                }
                "dir" | "path" => {
                    if !trimmed.is_empty() {
                        local_dir = Some(PathBuf::from(trimmed));
                    }
                }
                _ => {}
            }
        }
    }

    match location.as_str() {
        "local" => {
            let Some(dir) = local_dir else {
                return Err(
                    "bandview://local requires dir=... pointing at a downloaded chapter."
                        .to_string(),
                );
            };
            if base_url.is_some() || chapter_id.is_some() {
                return Err(
                    "Cannot mix bandview://local with server=/chapter= parameters.".to_string(),
                );
            }
            Ok(LaunchRequest::LocalDir(dir))
        }
        "read" | "" => build_request(base_url, chapter_id, local_dir)?
            .ok_or_else(|| "No chapter found in URL. Use server=...&chapter=...".to_string()),
        other => Err(format!(
            "Unknown bandview action '{other}'. Use bandview://read or bandview://local."
        )),
    }
}

fn build_request(
    base_url: Option<String>,
    chapter_id: Option<i64>,
    local_dir: Option<PathBuf>,
) -> Result<Option<LaunchRequest>, String> {
    if let Some(dir) = local_dir {
        if base_url.is_some() || chapter_id.is_some() {
            return Err(
                "Cannot mix a local chapter directory with --server/--chapter.".to_string(),
            );
        }
        return Ok(Some(LaunchRequest::LocalDir(dir)));
    }

    match (base_url, chapter_id) {
        (Some(base_url), Some(chapter_id)) => Ok(Some(LaunchRequest::Remote {
            base_url,
            chapter_id,
        })),
        (Some(_), None) => Err("Remote launch requires --chapter (or chapter=...).".to_string()),
        (None, Some(_)) => Err("Remote launch requires --server (or server=...).".to_string()),
        (None, None) => Ok(None),
    }
}

fn parse_chapter_id(value: &str) -> Result<i64, String> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("Chapter id '{}' must be an integer.", value.trim()))
}

fn is_bandview_uri(value: &str) -> bool {
    strip_bandview_scheme(value).is_some()
}

fn strip_bandview_scheme(uri: &str) -> Option<&str> {
    let prefix = "bandview://";
    if uri.len() >= prefix.len() && uri[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&uri[prefix.len()..])
    } else {
        None
    }
}

fn split_location_and_query(value: &str) -> (&str, Option<&str>) {
    if let Some((location, query)) = value.split_once('?') {
        (location, Some(query))
    } else {
        (value, None)
    }
}

fn percent_decode(value: &str) -> Result<String, String> {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'+' => {
                decoded.push(b' ');
                index += 1;
            }
            b'%' => {
                if index + 2 >= bytes.len() {
                    return Err("Invalid percent-encoding in URL.".to_string());
                }
                let hi = decode_hex_digit(bytes[index + 1])
                    .ok_or_else(|| "Invalid percent-encoding in URL.".to_string())?;
                let lo = decode_hex_digit(bytes[index + 2])
                    .ok_or_else(|| "Invalid percent-encoding in URL.".to_string())?;
                decoded.push((hi << 4) | lo);
                index += 3;
            }
            byte => {
                decoded.push(byte);
                index += 1;
            }
        }
    }

    String::from_utf8(decoded).map_err(|_| "URL contains invalid UTF-8 after decoding.".to_string())
}

fn decode_hex_digit(value: u8) -> Option<u8> {
    match value {
        b'0'..=b'9' => Some(value - b'0'),
        b'a'..=b'f' => Some(value - b'a' + 10),
        b'A'..=b'F' => Some(value - b'A' + 10),
        _ => None,
    }
}
