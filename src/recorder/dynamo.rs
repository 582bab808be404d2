use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, KeySchemaElement, KeyType, ProvisionedThroughput,
    ScalarAttributeType,
};

use super::{FILENAME_ATTRIBUTE, ResultRecord, ResultRecorder, WORDS_ATTRIBUTE};
use crate::error::RecordError;
use crate::job::JobResult;

/// Writes results to a DynamoDB table.
#[derive(Debug, Clone)]
pub struct DynamoRecorder {
    client: Client,
    table_name: String,
}

impl DynamoRecorder {
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Creates the result table with `Filename` as its string hash key.
    pub async fn create_table(&self) -> Result<(), RecordError> {
        let provision = |e: aws_sdk_dynamodb::error::BuildError| RecordError::Provision(e.to_string());

        let attribute = AttributeDefinition::builder()
            .attribute_name(FILENAME_ATTRIBUTE)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(provision)?;
        let key = KeySchemaElement::builder()
            .attribute_name(FILENAME_ATTRIBUTE)
            .key_type(KeyType::Hash)
            .build()
            .map_err(provision)?;
        let throughput = ProvisionedThroughput::builder()
            .read_capacity_units(1)
            .write_capacity_units(1)
            .build()
            .map_err(provision)?;

        self.client
            .create_table()
            .table_name(&self.table_name)
            .attribute_definitions(attribute)
            .key_schema(key)
            .provisioned_throughput(throughput)
            .send()
            .await
            .map_err(|e| RecordError::Provision(DisplayErrorContext(e).to_string()))?;
        Ok(())
    }
}

/// Converts a record into DynamoDB attribute values.
fn to_item(record: ResultRecord) -> HashMap<String, AttributeValue> {
    let words = record
        .words
        .into_iter()
        .map(|(word, count)| (word, AttributeValue::N(count.to_string())))
        .collect();

    HashMap::from([
        (FILENAME_ATTRIBUTE.to_string(), AttributeValue::S(record.filename)),
        (WORDS_ATTRIBUTE.to_string(), AttributeValue::M(words)),
    ])
}

#[async_trait]
impl ResultRecorder for DynamoRecorder {
    async fn record(&self, result: &JobResult) -> Result<(), RecordError> {
        let record = ResultRecord::from(result);
        if record.filename.is_empty() || record.filename == "/" {
            return Err(RecordError::Serialize("result has no filename".into()));
        }

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(to_item(record)))
            .send()
            .await
            .map_err(|e| RecordError::Write(DisplayErrorContext(e).to_string()))?;
        Ok(())
    }
}
