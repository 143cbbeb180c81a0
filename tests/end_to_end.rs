use std::sync::Arc;

use serde_json::json;

use genoflow_agent::AnalysisAgent;
use genoflow_core::config::{AgentConfig, ToolsConfig, VerificationConfig};
use genoflow_test_utils::{
    fenced_plan, temp_file, CannedCapability, EchoKnowledge, ScriptedOracle, StaticRegistry,
};
use genoflow_tools::{FormatRegistry, GenomicValidator};

const VCF: &str = "##fileformat=VCFv4.2\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
chr1\t12345\trs1\tA\tG\t50\tPASS\tDP=20\n\
chr2\t500\t.\tC\tT\t12.5\tPASS\tDP=9\n";

const BAD_VCF: &str = "##fileformat=VCFv4.2\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
chr1\t300000000\t.\tA\tG\t50\tPASS\tDP=20\n";

fn vcf_plan(path: &str) -> String {
    fenced_plan(&json!({
        "steps": [
            {
                "step_id": "step_1",
                "step_type": "file_parsing",
                "description": "Parse the VCF file",
                "parameters": {"file_path": path},
                "output_key": "vcf"
            },
            {
                "step_id": "step_2",
                "step_type": "data_validation",
                "description": "Validate variant coordinates and alleles",
                "parameters": {"data_key": "vcf", "check": "variants"},
                "depends_on": ["step_1"],
                "output_key": "validation"
            },
            {
                "step_id": "step_3",
                "step_type": "knowledge_query",
                "description": "Look up the gene",
                "parameters": {"database": "ensembl", "query": {"symbol": "BRCA1"}},
                "depends_on": ["step_2"],
                "output_key": "gene"
            },
            {
                "step_id": "step_4",
                "step_type": "result_aggregation",
                "description": "Summarize",
                "parameters": {"result_keys": ["validation", "gene"]},
                "depends_on": ["step_3"],
                "output_key": "summary"
            }
        ]
    }))
}

fn agent(oracle: Arc<ScriptedOracle>) -> AnalysisAgent {
    AnalysisAgent::builder(oracle)
        .capabilities(Arc::new(
            StaticRegistry::new().with(CannedCapability::new("samtools_stats", json!("Total reads: 1000"))),
        ))
        .formats(Arc::new(FormatRegistry::with_builtins(&ToolsConfig::default())))
        .validator(Arc::new(GenomicValidator::new(&VerificationConfig::default())))
        .knowledge(Arc::new(EchoKnowledge))
        .agent_config(AgentConfig {
            enable_reasoning: false,
            ..AgentConfig::default()
        })
        .build()
        .expect("agent")
}

#[tokio::test]
async fn test_vcf_workflow_completes() {
    let file = temp_file(".vcf", VCF);
    let path = file.path().to_str().expect("utf-8 path");
    let oracle = Arc::new(ScriptedOracle::new([vcf_plan(path)]));
    let mut agent = agent(oracle);

    let report = agent.execute("Validate the variants in my VCF", None).await;

    assert!(report.starts_with("# Analysis Complete"), "{report}");
    assert!(report.contains("### vcf"));
    assert!(report.contains("\"variant_count\": 2"));
    assert!(report.contains("### summary"));
    assert!(report.contains("\"valid\": true"));
    assert!(report.contains("BRCA1"));

    let results = agent.state().intermediate_results();
    let keys: Vec<&String> = results.keys().collect();
    assert_eq!(keys, vec!["vcf", "validation", "gene", "summary"]);
    assert!(agent.state().errors().is_empty());
}

#[tokio::test]
async fn test_invalid_variant_stops_the_run() {
    let file = temp_file(".vcf", BAD_VCF);
    let path = file.path().to_str().expect("utf-8 path");
    let oracle = Arc::new(ScriptedOracle::new([vcf_plan(path)]));
    let mut agent = agent(oracle);

    let report = agent.execute("Validate the variants in my VCF", None).await;

    assert!(report.starts_with("# Analysis Failed"), "{report}");
    assert!(report.contains("Failed at step: Validate variant coordinates and alleles"));
    assert!(report.contains("exceeds chromosome"));
    assert!(report.contains("## Partial Results\n\n### vcf"));
    assert!(!report.contains("BRCA1"));
    assert_eq!(agent.state().errors().len(), 1);
}

#[tokio::test]
async fn test_tool_step_reports_read_count() {
    let plan = fenced_plan(&json!({
        "steps": [{
            "step_id": "step_1",
            "step_type": "tool_execution",
            "description": "Count reads",
            "tool_name": "samtools_stats",
            "parameters": {"input_file": "sample.bam"},
            "output_key": "stats"
        }]
    }));
    let mut agent = agent(Arc::new(ScriptedOracle::new([plan])));

    let report = agent.execute("How many reads are in sample.bam?", None).await;
    assert!(report.contains("### stats\n```\nTotal reads: 1000\n```"));
    assert_eq!(agent.conversation_history().len(), 2);
}

#[tokio::test]
async fn test_fastq_summary_passes_constraint_checks() {
    let file = temp_file(".fastq", "@r1\nACGTACGT\n+\nIIIIIIII\n@r2\nGGCCAATT\n+\nIIIIIIII\n");
    let path = file.path().to_str().expect("utf-8 path");
    let plan = fenced_plan(&json!({
        "steps": [
            {
                "step_id": "step_1",
                "step_type": "file_parsing",
                "description": "Summarize reads",
                "parameters": {"file_path": path},
                "output_key": "reads"
            },
            {
                "step_id": "step_2",
                "step_type": "data_validation",
                "description": "Check read statistics",
                "parameters": {"data_key": "reads", "check": "constraints"},
                "depends_on": ["step_1"],
                "output_key": "qc"
            }
        ]
    }));
    let mut agent = agent(Arc::new(ScriptedOracle::new([plan])));

    let report = agent.execute("Is my FASTQ sane?", None).await;
    assert!(report.starts_with("# Analysis Complete"), "{report}");
    assert!(report.contains("\"average_gc_content\": 50.0"));
    assert_eq!(agent.state().intermediate_results()["qc"]["valid"], true);
}

#[tokio::test]
async fn test_unparseable_plan_uses_fallback() {
    let oracle = Arc::new(ScriptedOracle::new(["Sorry, I can only chat."]));
    let mut agent = agent(oracle);

    let report = agent.execute("Do something", None).await;
    assert!(report.starts_with("# Analysis Failed"));
    assert!(report.contains("Process query: Do something"));
}
