pub mod bucket;
pub mod command;
pub mod error;
pub mod marshal;
pub mod parcel;
pub mod predicates;
pub mod types;
pub mod value;


pub use bucket::ValuesBucket;
pub use command::{DataShareCommand, ObserverCommand, DATA_SHARE_ERROR, INTERFACE_TOKEN, OBSERVER_TOKEN};
pub use error::{DataShareError, Result};
pub use marshal::{Marshal, Unmarshal};
pub use parcel::{Parcel, ParcelReader};
pub use predicates::{OperationItem, OperationType, ParameterCount, Predicates, SettingMode};
pub use types::{
    result_code, Data, ObserverRef, OperationResult, PredicateTemplateNode, PublishedDataChangeNode,
    PublishedDataItem, PublishedValue, RdbChangeNode, ResultSet, Template, TemplateId, Uri,
};
pub use value::{PredicateObject, ValueObject};
