//! Worker-id substitution in command templates.

pub use parexec_core::DEFAULT_WORKER_ID_TOKEN;

/// Replace every occurrence of `token` in `template` with the decimal `worker_id`.
///
/// An empty token leaves the template unchanged.
pub fn substitute_worker_id(template: &str, token: &str, worker_id: usize) -> String {
    if token.is_empty() {
        return template.to_string();
    }
    template.replace(token, &worker_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_single_occurrence() {
        assert_eq!(
            substitute_worker_id("echo a #workerId#", DEFAULT_WORKER_ID_TOKEN, 0),
            "echo a 0"
        );
    }

    #[test]
    fn replaces_every_occurrence() {
        let cmd = substitute_worker_id(
            "serve --port 90#workerId# --log /tmp/w#workerId#.log",
            DEFAULT_WORKER_ID_TOKEN,
            3,
        );
        assert_eq!(cmd, "serve --port 903 --log /tmp/w3.log");
    }

    #[test]
    fn no_padding_for_multi_digit_ids() {
        assert_eq!(substitute_worker_id("dev#workerId#", DEFAULT_WORKER_ID_TOKEN, 12), "dev12");
    }

    #[test]
    fn template_without_token_is_unchanged() {
        assert_eq!(substitute_worker_id("make test", DEFAULT_WORKER_ID_TOKEN, 5), "make test");
    }

    #[test]
    fn custom_and_empty_tokens() {
        assert_eq!(substitute_worker_id("gpu={id}", "{id}", 1), "gpu=1");
        assert_eq!(substitute_worker_id("gpu={id}", "", 1), "gpu={id}");
    }
}
