mod entity;

use proc_macro::TokenStream;

// ============================================================================
// #[derive(Entity)]
// ============================================================================

/// Derive macro implementing `keyed_store::Entity` for a struct with named fields.
///
/// # Usage
///
/// ```ignore
/// #[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Entity)]
/// #[entity(collection = "grocery_items", validate = "check")]
/// struct GroceryItem {
///     #[entity(id)]
///     pub sku: u64,
///     pub name: String,
///     pub quantity: i64,
/// }
///
/// impl GroceryItem {
///     fn check(&self) -> Result<(), InvalidValue> {
///         if self.quantity < 0 {
///             return Err(InvalidValue::new("quantity", "must not be negative"));
///         }
///         Ok(())
///     }
/// }
///
/// let restocked = item.with_quantity(40);
/// ```
///
/// Struct-level attributes:
/// - `collection = "..."`: stable collection name written to backing files.
///   Defaults to the snake_case struct name plus `s`.
/// - `validate = "method"`: inherent `fn(&self) -> Result<(), InvalidValue>`
///   consulted on every add, update and load.
///
/// Field-level attributes:
/// - `id`: marks the identity field. Defaults to the field named `id`.
///   Its type must be `u8`, `u16`, `u32`, `u64` or `EntityId`; signed
///   integers are rejected with a compile error because they do not
///   convert losslessly into `EntityId` (`u64`).
///
/// Every non-id field also gets a `with_<field>(&self, value) -> Self`
/// method returning a copy with that one field replaced.
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    entity::derive_entity(input)
}
