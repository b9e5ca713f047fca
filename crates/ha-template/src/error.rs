use thiserror::Error;

pub type TemplateResult<T> = Result<T, TemplateError>;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("invalid template syntax: {0}")]
    Syntax(String),

    #[error("undefined value: {0}")]
    Undefined(String),

    #[error("failed to render template: {0}")]
    Render(String),
}

impl From<minijinja::Error> for TemplateError {
    fn from(err: minijinja::Error) -> Self {
        match err.kind() {
            minijinja::ErrorKind::SyntaxError => TemplateError::Syntax(err.to_string()),
            minijinja::ErrorKind::UndefinedError => TemplateError::Undefined(err.to_string()),
            _ => TemplateError::Render(err.to_string()),
        }
    }
}
