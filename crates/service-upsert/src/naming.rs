use regex::Regex;

use crate::error::{Error, Result};

pub const DEFAULT_PLACEHOLDER: &str = "develop";

/// Turns a branch name into something usable inside a service name and a
/// host label: every character outside `[A-Za-z0-9_]` becomes `_`.
pub fn sanitize_branch(branch: &str) -> Result<String> {
    let re = Regex::new(r"[^A-Za-z0-9_]")
        .map_err(|e| Error::validation(format!("branch pattern: {e}")))?;
    Ok(re.replace_all(branch.trim(), "_").into_owned())
}

/// `app_develop` + `feature/login` -> `app_feature_login`.
pub fn derive_target_name(template: &str, branch: &str, placeholder: &str) -> Result<String> {
    let branch = sanitize_branch(branch)?;
    if branch.is_empty() {
        return Err(Error::validation("branch name is empty"));
    }
    let placeholder = placeholder.trim();
    if placeholder.is_empty() || !template.contains(placeholder) {
        return Err(Error::validation(format!(
            "template '{template}' does not contain placeholder '{placeholder}'"
        )));
    }
    Ok(template.replace(placeholder, &branch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_non_word_characters() {
        assert_eq!(sanitize_branch("feature/login-v2").unwrap(), "feature_login_v2");
        assert_eq!(sanitize_branch("already_ok9").unwrap(), "already_ok9");
        assert_eq!(sanitize_branch("ação").unwrap(), "a__o");
    }

    #[test]
    fn replaces_every_placeholder() {
        assert_eq!(
            derive_target_name("shop_develop", "fix/cart", DEFAULT_PLACEHOLDER).unwrap(),
            "shop_fix_cart"
        );
        assert_eq!(
            derive_target_name("develop-develop", "x", DEFAULT_PLACEHOLDER).unwrap(),
            "x-x"
        );
    }

    #[test]
    fn rejects_template_without_placeholder() {
        assert!(derive_target_name("shop_main", "fix", DEFAULT_PLACEHOLDER).is_err());
        assert!(derive_target_name("shop_develop", "  ", DEFAULT_PLACEHOLDER).is_err());
    }
}
