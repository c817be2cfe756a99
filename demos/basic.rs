use layerfilter::*;
use std::sync::Arc;

fn main() -> Result<(), LayerFilterError> {
    // 1. Load configuration
    let config = Arc::new(PlannerConfig::from_json(r#"{"rankBySelectivity":true}"#)?);

    // 2. Decode a filter: forms layered Base, then Patch or Hotfix, then Dev
    let filter_json = r#"{"type":"AND","children":[
        {"type":"COMPONENT_TYPE","value":"Form"},
        {"type":"ORDER_STRICT","sequence":["Base",["Patch","Hotfix"],"Dev"]}
    ]}"#;
    let filter = CompiledFilter::from_json(filter_json, config)?;

    // 3. Inspect the plan
    let plan = filter.plan();
    println!("Capability: {}", plan.capability);
    println!("Shape: {}", plan.shape);
    println!("Rationale: {}", plan.rationale);
    println!("Predicate: {}", plan.predicate);
    for op in &plan.prefetch {
        println!("Pre-fetch: {}", serde_json::to_string(op)?);
    }

    // 4. Build a store
    let store = MemoryStore::new(vec![
        Component::new("account_main", "Form")
            .layer(Layer::new("Base", 0).managed(true))
            .layer(Layer::new("Patch", 1).managed(true))
            .layer(Layer::new("Dev", 2)),
        Component::new("contact_main", "Form")
            .layer(Layer::new("Base", 0).managed(true))
            .layer(Layer::new("Other", 1))
            .layer(Layer::new("Dev", 2)),
        Component::new("account_view", "View")
            .layer(Layer::new("Base", 0))
            .layer(Layer::new("Hotfix", 1))
            .layer(Layer::new("Dev", 2)),
    ]);

    // 5. Execute: pre-fetch, rebuild predicate, query, residual
    let rows = filter.execute(&store)?;
    for c in &rows {
        println!("Matched: {}", c.logical_name);
    }
    Ok(())
}
