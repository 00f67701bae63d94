use sandrun::{ExecutionRequest, LanguageId, Runner};

use super::{container_runner, local_runner};

async fn every_template_runs(runner: Runner) {
    for language in runner.languages() {
        let result = runner
            .execute(ExecutionRequest::new(language.template.clone(), language.id.as_str()))
            .await
            .unwrap_or_else(|e| panic!("{} template rejected: {e}", language.id));
        assert!(result.success, "{} template failed: {result:?}", language.id);
    }
}

#[test]
fn test_every_language_has_a_template() {
    let runner = local_runner();
    assert_eq!(runner.languages().len(), LanguageId::ALL.len());
    for id in LanguageId::ALL {
        let template = runner.template(id.as_str()).expect("missing template");
        assert!(!template.trim().is_empty(), "{id} template is empty");
    }
}

#[tokio::test]
#[ignore = "requires python3, node, a JDK, g++, gcc and bash"]
async fn test_templates_run_locally() {
    every_template_runs(local_runner()).await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_templates_run_in_containers() {
    every_template_runs(container_runner()).await;
}
