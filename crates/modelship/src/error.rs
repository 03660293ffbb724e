use modelship_publish::PublishError;

/// Render a command failure with its causes. A failed deployment also names
/// the repository it was working on, which is never cleaned up.
pub fn format_error(err: &anyhow::Error) -> String {
    let mut msg = format!("error: {err}");
    for cause in err.chain().skip(1) {
        msg.push_str(&format!("\n  caused by: {cause}"));
    }
    if let Some(repository) = err
        .downcast_ref::<PublishError>()
        .and_then(PublishError::repository)
    {
        msg.push_str(&format!("\n  repository: {repository}"));
    }
    msg
}
