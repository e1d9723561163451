pub(crate) mod formula;
pub(crate) mod grading;
pub(crate) mod plausibility;
pub(crate) mod problem_cache;
pub(crate) mod problem_generator;
pub(crate) mod problem_pool;
pub(crate) mod problem_tokens;
pub(crate) mod range_rules;
pub(crate) mod submission;
pub(crate) mod template_cache;
